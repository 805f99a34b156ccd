//! Typed errors for reconciliation operations.

use accounting_core::error::AppError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("statement does not balance: difference of {difference} remains")]
    NotBalanced { difference: Decimal },

    #[error("reconciliation {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("reconciliation {0} not found")]
    ReconciliationNotFound(Uuid),

    #[error("reconciliation item {0} not found")]
    ItemNotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<ReconciliationError> for AppError {
    fn from(err: ReconciliationError) -> Self {
        match err {
            ReconciliationError::NotBalanced { .. } => {
                AppError::InvariantViolation(anyhow::anyhow!("{err}"))
            }
            ReconciliationError::AlreadyCompleted(_) => {
                AppError::StateConflict(anyhow::anyhow!("{err}"))
            }
            ReconciliationError::ReconciliationNotFound(_)
            | ReconciliationError::ItemNotFound(_) => AppError::NotFound(anyhow::anyhow!("{err}")),
            ReconciliationError::Validation(e) => AppError::ValidationError(e),
            ReconciliationError::Storage(e) => e,
        }
    }
}
