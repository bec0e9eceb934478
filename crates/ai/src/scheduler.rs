use replenish_core::CompanyId;

use crate::error::AiError;
use crate::job::AiJob;

/// Company scope for execution.
///
/// - `Any`: run jobs for any company (shared engine).
/// - `Company`: only accept jobs for the specified company.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompanyScope {
    Any,
    Company(CompanyId),
}

impl CompanyScope {
    pub fn allows(&self, company_id: CompanyId) -> bool {
        match self {
            CompanyScope::Any => true,
            CompanyScope::Company(c) => *c == company_id,
        }
    }
}

/// Scheduler/executor for analysis jobs.
pub trait AiScheduler: Send + Sync + 'static {
    fn scope(&self) -> CompanyScope;

    fn run<J: AiJob>(&self, job: J) -> Result<J::Output, AiError> {
        if !self.scope().allows(job.company_id()) {
            return Err(AiError::InvalidInput(
                "company scope violation (job company not allowed by scheduler)".to_string(),
            ));
        }
        job.run()
    }
}

/// Synchronous scheduler that runs jobs inline.
#[derive(Debug, Copy, Clone)]
pub struct LocalAiScheduler {
    scope: CompanyScope,
}

impl LocalAiScheduler {
    pub fn new(scope: CompanyScope) -> Self {
        Self { scope }
    }

    pub fn for_company(company_id: CompanyId) -> Self {
        Self::new(CompanyScope::Company(company_id))
    }
}

impl Default for LocalAiScheduler {
    fn default() -> Self {
        Self::new(CompanyScope::Any)
    }
}

impl AiScheduler for LocalAiScheduler {
    fn scope(&self) -> CompanyScope {
        self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoJob {
        company_id: CompanyId,
        input: u32,
    }

    impl AiJob for EchoJob {
        type Input = u32;
        type Output = u32;

        fn company_id(&self) -> CompanyId {
            self.company_id
        }

        fn input(&self) -> &u32 {
            &self.input
        }

        fn run(&self) -> Result<u32, AiError> {
            Ok(self.input * 2)
        }
    }

    #[test]
    fn scoped_scheduler_rejects_foreign_company() {
        let scheduler = LocalAiScheduler::for_company(CompanyId::new());
        let job = EchoJob {
            company_id: CompanyId::new(),
            input: 1,
        };
        assert!(matches!(scheduler.run(job), Err(AiError::InvalidInput(_))));
    }

    #[test]
    fn any_scope_runs_job() {
        let scheduler = LocalAiScheduler::default();
        let job = EchoJob {
            company_id: CompanyId::new(),
            input: 21,
        };
        assert_eq!(scheduler.run(job).unwrap(), 42);
    }
}
