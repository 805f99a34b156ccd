//! Reconciliation persistence seam.
//!
//! Item toggles are independent single-row writes; only `complete`
//! re-reads the authoritative item set inside its own critical section so
//! a stale cleared-total can never complete a statement.

mod memory;
mod postgres;

pub use memory::MemReconciliationStore;
pub use postgres::PgReconciliationStore;

use accounting_core::error::AppError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{BankReconciliation, ReconciliationItem};

/// Result of a per-item cleared toggle.
#[derive(Debug, Clone)]
pub enum ToggleOutcome {
    Updated(ReconciliationItem),
    /// The parent reconciliation is already completed.
    Completed,
    NotFound,
}

/// Result of a completion attempt, decided against the current item set.
#[derive(Debug, Clone)]
pub enum CompleteOutcome {
    Completed(BankReconciliation),
    NotBalanced { difference: Decimal },
    AlreadyCompleted,
    NotFound,
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Persist a reconciliation and its snapshotted items atomically.
    async fn insert_reconciliation(
        &self,
        reconciliation: BankReconciliation,
        items: Vec<ReconciliationItem>,
    ) -> Result<BankReconciliation, AppError>;

    async fn get_reconciliation(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Option<BankReconciliation>, AppError>;

    async fn list_reconciliations(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        limit: i32,
    ) -> Result<Vec<BankReconciliation>, AppError>;

    async fn items(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Vec<ReconciliationItem>, AppError>;

    async fn get_item(
        &self,
        company_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError>;

    /// Idempotently set one item's cleared flag. Refused once the parent
    /// reconciliation is completed.
    async fn set_item_cleared(
        &self,
        company_id: Uuid,
        item_id: Uuid,
        cleared: bool,
    ) -> Result<ToggleOutcome, AppError>;

    /// Transition to Completed iff the statement balances against the
    /// items as they exist at commit time.
    async fn complete(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<CompleteOutcome, AppError>;
}
