//! Allocation source model (payments, deposits, credit memos).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Source of funds kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Payment,
    Deposit,
    CreditMemo,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "payment",
            Self::Deposit => "deposit",
            Self::CreditMemo => "credit_memo",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Open,
    PartiallyApplied,
    Applied,
    Refunded,
    Voided,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PartiallyApplied => "partially_applied",
            Self::Applied => "applied",
            Self::Refunded => "refunded",
            Self::Voided => "voided",
        }
    }

    /// Whether a source in this status can fund further allocations.
    pub fn is_allocatable(&self) -> bool {
        matches!(self, Self::Open | Self::PartiallyApplied)
    }
}

impl std::fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment, customer deposit, or credit memo to spread across documents.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AllocationSource {
    pub source_id: Uuid,
    pub company_id: Uuid,
    pub kind: SourceKind,
    pub reference: Option<String>,
    pub received_date: NaiveDate,
    pub amount: Decimal,
    pub amount_applied: Decimal,
    pub status: SourceStatus,
    pub version: i64,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl AllocationSource {
    /// Funds not yet applied to any document.
    pub fn balance_remaining(&self) -> Decimal {
        self.amount - self.amount_applied
    }
}

/// Input for creating a source.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSource {
    pub company_id: Uuid,
    pub kind: SourceKind,
    #[validate(length(max = 64))]
    pub reference: Option<String>,
    pub received_date: NaiveDate,
    pub amount: Decimal,
    pub metadata: Option<serde_json::Value>,
}
