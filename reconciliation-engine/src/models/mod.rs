//! Domain models for the reconciliation engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Reconciliation lifecycle. Completed is terminal; re-opening means
/// starting a new reconciliation that supersedes this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    InProgress,
    Completed,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a candidate item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    BankTransaction,
    JournalEntry,
}

impl ItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransaction => "bank_transaction",
            Self::JournalEntry => "journal_entry",
        }
    }
}

impl std::fmt::Display for ItemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One bank statement reconciliation session.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BankReconciliation {
    pub reconciliation_id: Uuid,
    pub company_id: Uuid,
    /// The ledger asset account that mirrors the bank account.
    pub bank_account_id: Uuid,
    pub statement_date: NaiveDate,
    pub statement_ending_balance: Decimal,
    pub beginning_balance: Decimal,
    pub status: ReconciliationStatus,
    pub started_utc: DateTime<Utc>,
    pub completed_utc: Option<DateTime<Utc>>,
}

/// A candidate transaction snapshotted into a reconciliation.
///
/// Amounts are signed from the bank account's point of view: positive is
/// a deposit, negative a payment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReconciliationItem {
    pub item_id: Uuid,
    pub reconciliation_id: Uuid,
    pub source: ItemSource,
    /// The bank transaction or journal entry this item mirrors.
    pub source_ref: Uuid,
    pub item_date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub is_cleared: bool,
    pub cleared_utc: Option<DateTime<Utc>>,
}

/// Candidate supplied when a reconciliation starts (normalized upstream:
/// bank feed records and posted ledger lines for the account).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CandidateItem {
    pub source: ItemSource,
    pub source_ref: Uuid,
    pub item_date: NaiveDate,
    #[validate(length(max = 256))]
    pub description: String,
    pub amount: Decimal,
}

/// Input for starting a reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StartReconciliation {
    pub company_id: Uuid,
    pub bank_account_id: Uuid,
    pub statement_date: NaiveDate,
    pub statement_ending_balance: Decimal,
    pub beginning_balance: Decimal,
    #[validate(nested)]
    pub candidates: Vec<CandidateItem>,
}

/// Running cleared totals for a reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationSummary {
    pub cleared_deposits: Decimal,
    pub cleared_payments: Decimal,
    pub cleared_balance: Decimal,
    pub difference: Decimal,
    pub balanced: bool,
    pub cleared_count: i32,
    pub uncleared_count: i32,
}

impl ReconciliationSummary {
    /// The cleared-balance equation. Both the summary query and the
    /// completion gate derive from this one place.
    pub fn compute(
        reconciliation: &BankReconciliation,
        items: &[ReconciliationItem],
    ) -> Self {
        let mut cleared_deposits = Decimal::ZERO;
        let mut cleared_payments = Decimal::ZERO;
        let mut cleared_count = 0;
        let mut uncleared_count = 0;
        for item in items {
            if item.is_cleared {
                cleared_count += 1;
                if item.amount > Decimal::ZERO {
                    cleared_deposits += item.amount;
                } else {
                    cleared_payments += -item.amount;
                }
            } else {
                uncleared_count += 1;
            }
        }
        let cleared_balance =
            reconciliation.beginning_balance + cleared_deposits - cleared_payments;
        let difference = reconciliation.statement_ending_balance - cleared_balance;
        Self {
            cleared_deposits,
            cleared_payments,
            cleared_balance,
            difference,
            balanced: accounting_core::money::is_balanced(difference),
            cleared_count,
            uncleared_count,
        }
    }
}
