//! Shared helpers for reconciliation engine tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use reconciliation_engine::models::{
    BankReconciliation, CandidateItem, ItemSource, StartReconciliation,
};
use reconciliation_engine::services::Reconciler;
use reconciliation_engine::store::MemReconciliationStore;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct TestReconciler {
    pub reconciler: Reconciler<MemReconciliationStore>,
    pub company_id: Uuid,
    pub bank_account_id: Uuid,
}

pub fn spawn_reconciler() -> TestReconciler {
    TestReconciler {
        reconciler: Reconciler::new(Arc::new(MemReconciliationStore::new())),
        company_id: Uuid::new_v4(),
        bank_account_id: Uuid::new_v4(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// A signed candidate amount: positive = deposit, negative = payment.
pub fn candidate(amount: &str, day: u32) -> CandidateItem {
    CandidateItem {
        source: ItemSource::BankTransaction,
        source_ref: Uuid::new_v4(),
        item_date: date(2026, 3, day),
        description: "statement line".to_string(),
        amount: dec(amount),
    }
}

/// Start a reconciliation with the given balances and candidates.
pub async fn start_reconciliation(
    t: &TestReconciler,
    beginning: &str,
    ending: &str,
    candidates: Vec<CandidateItem>,
) -> BankReconciliation {
    t.reconciler
        .start(&StartReconciliation {
            company_id: t.company_id,
            bank_account_id: t.bank_account_id,
            statement_date: date(2026, 3, 31),
            statement_ending_balance: dec(ending),
            beginning_balance: dec(beginning),
            candidates,
        })
        .await
        .expect("start reconciliation")
}
