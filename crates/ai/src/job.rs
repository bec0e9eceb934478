use replenish_core::CompanyId;

use crate::error::AiError;

/// A company-scoped analysis unit.
///
/// Inputs are snapshots supplied by callers (infra); this crate stays
/// storage-agnostic.
pub trait AiJob: Send + Sync + 'static {
    type Input: Send + Sync + 'static;
    type Output: Send + 'static;

    /// The company this job belongs to.
    fn company_id(&self) -> CompanyId;

    /// The input snapshot the job runs on.
    fn input(&self) -> &Self::Input;

    /// Execute the analysis.
    ///
    /// Must not mutate domain state.
    fn run(&self) -> Result<Self::Output, AiError>;
}
