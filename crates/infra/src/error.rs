use thiserror::Error;

use replenish_alerts::AlertError;
use replenish_core::{AlertId, CompanyId, ExecutionId, ProductId};

use crate::collaborators::CollaboratorError;
use crate::ledger::LedgerError;

/// Errors surfaced by the engine's operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A breach arrived for a product that already has a non-resolved Alert.
    #[error("duplicate alert: product already has active alert {existing}")]
    DuplicateAlert { existing: AlertId },

    #[error(transparent)]
    InvalidTransition(#[from] AlertError),

    #[error("alert {alert_id} already has execution {execution_id}")]
    ExecutionAlreadyExists {
        alert_id: AlertId,
        execution_id: ExecutionId,
    },

    #[error("unknown product {product_id} for company {company_id}")]
    UnknownProduct {
        company_id: CompanyId,
        product_id: ProductId,
    },

    /// Manual trigger on a product that is already being handled.
    #[error("product already has active alert {alert_id}")]
    ActiveAlertExists { alert_id: AlertId },

    #[error("alert not found: {0}")]
    AlertNotFound(AlertId),

    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    #[error("ledger error: {0}")]
    Store(LedgerError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::ActiveAlertExists { existing } => EngineError::DuplicateAlert { existing },
            LedgerError::ExecutionExists { alert_id, existing } => {
                EngineError::ExecutionAlreadyExists {
                    alert_id,
                    execution_id: existing,
                }
            }
            LedgerError::AlertNotFound(id) => EngineError::AlertNotFound(id),
            LedgerError::ExecutionNotFound(id) => EngineError::ExecutionNotFound(id),
            LedgerError::Transition(e) => EngineError::InvalidTransition(e),
            other => EngineError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_conflicts_map_to_engine_taxonomy() {
        let alert_id = AlertId::new();
        let execution_id = ExecutionId::new();

        assert_eq!(
            EngineError::from(LedgerError::ActiveAlertExists { existing: alert_id }),
            EngineError::DuplicateAlert { existing: alert_id }
        );
        assert_eq!(
            EngineError::from(LedgerError::ExecutionExists {
                alert_id,
                existing: execution_id
            }),
            EngineError::ExecutionAlreadyExists {
                alert_id,
                execution_id
            }
        );
        assert!(matches!(
            EngineError::from(LedgerError::Backend("down".into())),
            EngineError::Store(_)
        ));
    }
}
