//! Accounting period and year-end close models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Fiscal period. One per (company, fiscal year).
///
/// Once locked, no journal entry dated inside the window may be posted or
/// voided; the ledger checks this centrally before every write.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub period_id: Uuid,
    pub company_id: Uuid,
    pub fiscal_year: i32,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end: NaiveDate,
    pub is_locked: bool,
    pub closing_date: Option<NaiveDate>,
}

impl AccountingPeriod {
    /// Whether a transaction date falls inside this period.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.fiscal_year_start && date <= self.fiscal_year_end
    }
}

/// Input for creating an accounting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePeriod {
    pub company_id: Uuid,
    pub fiscal_year: i32,
    pub fiscal_year_start: NaiveDate,
    pub fiscal_year_end: NaiveDate,
}

/// Snapshot of a completed year-end close.
///
/// Existence of this record is the already-closed guard; closing checks
/// for it before generating anything.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct YearEndClose {
    pub close_id: Uuid,
    pub company_id: Uuid,
    pub fiscal_year: i32,
    pub close_date: NaiveDate,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
    pub retained_earnings_account_id: Uuid,
    /// None when the period had no activity to close.
    pub entry_id: Option<Uuid>,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
}
