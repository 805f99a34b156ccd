//! Typed errors for ledger operations.

use accounting_core::error::AppError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by posting, voiding, and period management.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("journal entry must have at least two lines")]
    EmptyEntry,

    #[error("entry is unbalanced: debits {debits} != credits {credits}")]
    Unbalanced { debits: Decimal, credits: Decimal },

    #[error("line amount {amount} must be greater than zero")]
    NonPositiveLineAmount { amount: Decimal },

    #[error("account {0} does not exist or is inactive")]
    UnknownAccount(Uuid),

    #[error("transaction date {date} falls inside locked fiscal year {fiscal_year}")]
    PeriodLocked { date: NaiveDate, fiscal_year: i32 },

    #[error("journal entry {entry_id} is {status}, expected {expected}")]
    InvalidStatus {
        entry_id: Uuid,
        status: String,
        expected: String,
    },

    #[error("journal entry {0} not found")]
    EntryNotFound(Uuid),

    #[error("account {0} not found")]
    AccountNotFound(Uuid),

    #[error("accounting period for fiscal year {0} not found")]
    PeriodNotFound(i32),

    #[error("fiscal year {0} cannot be unlocked: a year-end close exists")]
    UnlockAfterClose(i32),

    #[error("period window is invalid: {start} is after {end}")]
    InvalidPeriod { start: NaiveDate, end: NaiveDate },

    #[error("account {account_id} still carries a balance of {balance}")]
    AccountInUse { account_id: Uuid, balance: Decimal },

    #[error(transparent)]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::EmptyEntry
            | LedgerError::NonPositiveLineAmount { .. }
            | LedgerError::InvalidPeriod { .. } => AppError::BadRequest(anyhow::anyhow!("{err}")),
            LedgerError::Validation(e) => AppError::ValidationError(e),
            LedgerError::Unbalanced { .. } => AppError::InvariantViolation(anyhow::anyhow!("{err}")),
            LedgerError::UnknownAccount(_)
            | LedgerError::EntryNotFound(_)
            | LedgerError::AccountNotFound(_)
            | LedgerError::PeriodNotFound(_) => AppError::NotFound(anyhow::anyhow!("{err}")),
            LedgerError::PeriodLocked { .. }
            | LedgerError::InvalidStatus { .. }
            | LedgerError::UnlockAfterClose(_)
            | LedgerError::AccountInUse { .. } => AppError::StateConflict(anyhow::anyhow!("{err}")),
            LedgerError::Storage(e) => e,
        }
    }
}

/// Errors raised by the period-closing engine.
#[derive(Debug, Error)]
pub enum ClosingError {
    #[error("fiscal year {0} is already closed")]
    AlreadyClosed(i32),

    #[error("no retained earnings account selected, or the account is not an active equity account")]
    NoRetainedEarningsAccount,

    #[error("fiscal year {0} is locked and cannot accept a closing entry")]
    PeriodLocked(i32),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Storage(#[from] AppError),
}

impl From<ClosingError> for AppError {
    fn from(err: ClosingError) -> Self {
        match err {
            ClosingError::AlreadyClosed(_) | ClosingError::PeriodLocked(_) => {
                AppError::StateConflict(anyhow::anyhow!("{err}"))
            }
            ClosingError::NoRetainedEarningsAccount => {
                AppError::BadRequest(anyhow::anyhow!("{err}"))
            }
            ClosingError::Ledger(e) => e.into(),
            ClosingError::Storage(e) => e,
        }
    }
}
