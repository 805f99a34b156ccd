//! Typed errors for allocation operations.

use accounting_core::error::AppError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("allocation amount {0} must be greater than zero")]
    ZeroOrNegativeAmount(Decimal),

    #[error(
        "allocation of {requested} exceeds remaining balance of {remaining} on source {source_id}"
    )]
    SourceExhausted {
        source_id: Uuid,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error(
        "allocation of {requested} exceeds balance due of {balance_due} on document {document_id}"
    )]
    TargetOverpaid {
        document_id: Uuid,
        requested: Decimal,
        balance_due: Decimal,
    },

    #[error("document {document_id} is {status} and cannot receive allocations")]
    DocumentNotAllocatable { document_id: Uuid, status: String },

    #[error("source {source_id} is {status} and cannot fund allocations")]
    SourceNotAllocatable { source_id: Uuid, status: String },

    #[error("document {document_id} is {status}, expected {expected}")]
    InvalidDocumentStatus {
        document_id: Uuid,
        status: String,
        expected: String,
    },

    #[error("document {document_id} has {amount_paid} applied and cannot be voided")]
    DocumentHasPayments {
        document_id: Uuid,
        amount_paid: Decimal,
    },

    #[error("source {source_id} has {amount_applied} applied; unapply its allocations first")]
    SourceHasAllocations {
        source_id: Uuid,
        amount_applied: Decimal,
    },

    #[error("document amount {0} must be greater than zero")]
    NonPositiveDocumentAmount(Decimal),

    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("source {0} not found")]
    SourceNotFound(Uuid),

    #[error("allocation {0} not found")]
    AllocationNotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::ZeroOrNegativeAmount(_)
            | AllocationError::NonPositiveDocumentAmount(_) => {
                AppError::BadRequest(anyhow::anyhow!("{err}"))
            }
            AllocationError::Validation(e) => AppError::ValidationError(e),
            AllocationError::SourceExhausted { .. } | AllocationError::TargetOverpaid { .. } => {
                AppError::InvariantViolation(anyhow::anyhow!("{err}"))
            }
            AllocationError::DocumentNotAllocatable { .. }
            | AllocationError::SourceNotAllocatable { .. }
            | AllocationError::InvalidDocumentStatus { .. }
            | AllocationError::DocumentHasPayments { .. }
            | AllocationError::SourceHasAllocations { .. } => {
                AppError::StateConflict(anyhow::anyhow!("{err}"))
            }
            AllocationError::DocumentNotFound(_)
            | AllocationError::SourceNotFound(_)
            | AllocationError::AllocationNotFound(_) => {
                AppError::NotFound(anyhow::anyhow!("{err}"))
            }
            AllocationError::Storage(e) => e,
        }
    }
}
