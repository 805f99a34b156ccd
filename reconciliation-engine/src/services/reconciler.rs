//! Reconciliation session lifecycle.
//!
//! A session snapshots its candidate items at start; each item's cleared
//! flag is independent state, and completion is gated on the cleared-
//! balance equation re-checked at commit time.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::ReconciliationError;
use crate::models::{
    BankReconciliation, ReconciliationItem, ReconciliationStatus, ReconciliationSummary,
    StartReconciliation,
};
use crate::services::metrics::{COMPLETIONS_TOTAL, ITEM_TOGGLES_TOTAL, RECONCILIATIONS_STARTED};
use crate::store::{CompleteOutcome, ReconciliationStore, ToggleOutcome};

/// The reconciliation engine.
pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S: ReconciliationStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Start a reconciliation from the statement header and the candidate
    /// item set.
    #[instrument(skip(self, input), fields(company_id = %input.company_id, bank_account_id = %input.bank_account_id, candidate_count = input.candidates.len()))]
    pub async fn start(
        &self,
        input: &StartReconciliation,
    ) -> Result<BankReconciliation, ReconciliationError> {
        input.validate()?;

        let reconciliation_id = Uuid::new_v4();
        let reconciliation = BankReconciliation {
            reconciliation_id,
            company_id: input.company_id,
            bank_account_id: input.bank_account_id,
            statement_date: input.statement_date,
            statement_ending_balance: input.statement_ending_balance,
            beginning_balance: input.beginning_balance,
            status: ReconciliationStatus::InProgress,
            started_utc: Utc::now(),
            completed_utc: None,
        };
        let items: Vec<ReconciliationItem> = input
            .candidates
            .iter()
            .map(|candidate| ReconciliationItem {
                item_id: Uuid::new_v4(),
                reconciliation_id,
                source: candidate.source,
                source_ref: candidate.source_ref,
                item_date: candidate.item_date,
                description: candidate.description.clone(),
                amount: candidate.amount,
                is_cleared: false,
                cleared_utc: None,
            })
            .collect();

        let reconciliation = self
            .store
            .insert_reconciliation(reconciliation, items)
            .await?;
        RECONCILIATIONS_STARTED.with_label_values(&["ok"]).inc();

        info!(
            reconciliation_id = %reconciliation.reconciliation_id,
            statement_date = %reconciliation.statement_date,
            "Reconciliation started"
        );

        Ok(reconciliation)
    }

    pub async fn get(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<BankReconciliation, ReconciliationError> {
        self.store
            .get_reconciliation(company_id, reconciliation_id)
            .await?
            .ok_or(ReconciliationError::ReconciliationNotFound(
                reconciliation_id,
            ))
    }

    pub async fn list(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        limit: i32,
    ) -> Result<Vec<BankReconciliation>, ReconciliationError> {
        Ok(self
            .store
            .list_reconciliations(company_id, bank_account_id, limit)
            .await?)
    }

    pub async fn items(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Vec<ReconciliationItem>, ReconciliationError> {
        Ok(self.store.items(company_id, reconciliation_id).await?)
    }

    /// Set one item's cleared flag. Idempotent: re-clearing a cleared item
    /// keeps its original timestamp and changes nothing else.
    #[instrument(skip(self), fields(company_id = %company_id, item_id = %item_id, cleared = cleared))]
    pub async fn set_item_cleared(
        &self,
        company_id: Uuid,
        item_id: Uuid,
        cleared: bool,
    ) -> Result<ReconciliationItem, ReconciliationError> {
        match self
            .store
            .set_item_cleared(company_id, item_id, cleared)
            .await?
        {
            ToggleOutcome::Updated(item) => {
                ITEM_TOGGLES_TOTAL
                    .with_label_values(&[if cleared { "true" } else { "false" }])
                    .inc();
                Ok(item)
            }
            ToggleOutcome::Completed => {
                let item = self
                    .store
                    .get_item(company_id, item_id)
                    .await?
                    .ok_or(ReconciliationError::ItemNotFound(item_id))?;
                Err(ReconciliationError::AlreadyCompleted(
                    item.reconciliation_id,
                ))
            }
            ToggleOutcome::NotFound => Err(ReconciliationError::ItemNotFound(item_id)),
        }
    }

    /// Current cleared totals and difference.
    pub async fn summary(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<ReconciliationSummary, ReconciliationError> {
        let reconciliation = self.get(company_id, reconciliation_id).await?;
        let items = self.store.items(company_id, reconciliation_id).await?;
        Ok(ReconciliationSummary::compute(&reconciliation, &items))
    }

    /// Complete the reconciliation. Succeeds only when the statement
    /// balances; otherwise the computed difference comes back to the
    /// caller and the status is untouched.
    #[instrument(skip(self), fields(company_id = %company_id, reconciliation_id = %reconciliation_id))]
    pub async fn complete(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<BankReconciliation, ReconciliationError> {
        match self.store.complete(company_id, reconciliation_id).await? {
            CompleteOutcome::Completed(reconciliation) => {
                COMPLETIONS_TOTAL.with_label_values(&["completed"]).inc();
                info!(
                    reconciliation_id = %reconciliation.reconciliation_id,
                    "Reconciliation completed"
                );
                Ok(reconciliation)
            }
            CompleteOutcome::NotBalanced { difference } => {
                COMPLETIONS_TOTAL.with_label_values(&["not_balanced"]).inc();
                Err(ReconciliationError::NotBalanced { difference })
            }
            CompleteOutcome::AlreadyCompleted => {
                COMPLETIONS_TOTAL.with_label_values(&["conflict"]).inc();
                Err(ReconciliationError::AlreadyCompleted(reconciliation_id))
            }
            CompleteOutcome::NotFound => Err(ReconciliationError::ReconciliationNotFound(
                reconciliation_id,
            )),
        }
    }
}
