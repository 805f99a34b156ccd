//! In-process reconciliation store.

use std::collections::HashMap;
use std::sync::Mutex;

use accounting_core::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    BankReconciliation, ReconciliationItem, ReconciliationStatus, ReconciliationSummary,
};
use crate::store::{CompleteOutcome, ReconciliationStore, ToggleOutcome};

#[derive(Default)]
struct MemState {
    reconciliations: HashMap<Uuid, BankReconciliation>,
    items: HashMap<Uuid, ReconciliationItem>,
}

impl MemState {
    fn items_of(&self, reconciliation_id: Uuid) -> Vec<ReconciliationItem> {
        let mut items: Vec<ReconciliationItem> = self
            .items
            .values()
            .filter(|i| i.reconciliation_id == reconciliation_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.item_date.cmp(&b.item_date).then(a.item_id.cmp(&b.item_id)));
        items
    }
}

/// Memory-backed [`ReconciliationStore`].
#[derive(Default)]
pub struct MemReconciliationStore {
    state: Mutex<MemState>,
}

impl MemReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationStore for MemReconciliationStore {
    async fn insert_reconciliation(
        &self,
        reconciliation: BankReconciliation,
        items: Vec<ReconciliationItem>,
    ) -> Result<BankReconciliation, AppError> {
        let mut state = self.state.lock().expect("reconciliation store poisoned");
        state
            .reconciliations
            .insert(reconciliation.reconciliation_id, reconciliation.clone());
        for item in items {
            state.items.insert(item.item_id, item);
        }
        Ok(reconciliation)
    }

    async fn get_reconciliation(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Option<BankReconciliation>, AppError> {
        let state = self.state.lock().expect("reconciliation store poisoned");
        Ok(state
            .reconciliations
            .get(&reconciliation_id)
            .filter(|r| r.company_id == company_id)
            .cloned())
    }

    async fn list_reconciliations(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        limit: i32,
    ) -> Result<Vec<BankReconciliation>, AppError> {
        let state = self.state.lock().expect("reconciliation store poisoned");
        let limit = limit.clamp(1, 100) as usize;
        let mut reconciliations: Vec<BankReconciliation> = state
            .reconciliations
            .values()
            .filter(|r| r.company_id == company_id && r.bank_account_id == bank_account_id)
            .cloned()
            .collect();
        reconciliations.sort_by(|a, b| b.statement_date.cmp(&a.statement_date));
        reconciliations.truncate(limit);
        Ok(reconciliations)
    }

    async fn items(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Vec<ReconciliationItem>, AppError> {
        let state = self.state.lock().expect("reconciliation store poisoned");
        let known = state
            .reconciliations
            .get(&reconciliation_id)
            .is_some_and(|r| r.company_id == company_id);
        if !known {
            return Ok(Vec::new());
        }
        Ok(state.items_of(reconciliation_id))
    }

    async fn get_item(
        &self,
        company_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError> {
        let state = self.state.lock().expect("reconciliation store poisoned");
        let Some(item) = state.items.get(&item_id) else {
            return Ok(None);
        };
        let known = state
            .reconciliations
            .get(&item.reconciliation_id)
            .is_some_and(|r| r.company_id == company_id);
        Ok(known.then(|| item.clone()))
    }

    async fn set_item_cleared(
        &self,
        company_id: Uuid,
        item_id: Uuid,
        cleared: bool,
    ) -> Result<ToggleOutcome, AppError> {
        let mut state = self.state.lock().expect("reconciliation store poisoned");
        let Some(item) = state.items.get(&item_id).cloned() else {
            return Ok(ToggleOutcome::NotFound);
        };
        let Some(reconciliation) = state
            .reconciliations
            .get(&item.reconciliation_id)
            .filter(|r| r.company_id == company_id)
        else {
            return Ok(ToggleOutcome::NotFound);
        };
        if reconciliation.status == ReconciliationStatus::Completed {
            return Ok(ToggleOutcome::Completed);
        }

        let item = state.items.get_mut(&item_id).expect("checked above");
        item.is_cleared = cleared;
        item.cleared_utc = if cleared {
            // Keep the original timestamp on repeated toggles.
            item.cleared_utc.or_else(|| Some(Utc::now()))
        } else {
            None
        };
        Ok(ToggleOutcome::Updated(item.clone()))
    }

    async fn complete(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<CompleteOutcome, AppError> {
        let mut state = self.state.lock().expect("reconciliation store poisoned");
        let Some(reconciliation) = state
            .reconciliations
            .get(&reconciliation_id)
            .filter(|r| r.company_id == company_id)
            .cloned()
        else {
            return Ok(CompleteOutcome::NotFound);
        };
        if reconciliation.status == ReconciliationStatus::Completed {
            return Ok(CompleteOutcome::AlreadyCompleted);
        }

        // Decide against the item set as it exists right now, inside the
        // same critical section as the status flip.
        let items = state.items_of(reconciliation_id);
        let summary = ReconciliationSummary::compute(&reconciliation, &items);
        if !summary.balanced {
            return Ok(CompleteOutcome::NotBalanced {
                difference: summary.difference,
            });
        }

        let reconciliation = state
            .reconciliations
            .get_mut(&reconciliation_id)
            .expect("checked above");
        reconciliation.status = ReconciliationStatus::Completed;
        reconciliation.completed_utc = Some(Utc::now());
        Ok(CompleteOutcome::Completed(reconciliation.clone()))
    }
}
