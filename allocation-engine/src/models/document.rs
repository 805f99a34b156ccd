//! Allocatable document model (invoices and bills).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Invoice,
    Bill,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Bill => "bill",
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document status.
///
/// Draft documents cannot receive allocations; Open and Partial can; Paid
/// and Voided are terminal for allocation purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Open,
    Partial,
    Paid,
    Voided,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Voided => "voided",
        }
    }

    /// Whether a document in this status may receive allocations.
    pub fn is_allocatable(&self) -> bool {
        matches!(self, Self::Open | Self::Partial)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An invoice or bill that payments can be applied against.
///
/// amount_paid is denormalized from the allocation rows and only ever
/// written in the same transaction as them; the version column serializes
/// concurrent allocation attempts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AllocatableDocument {
    pub document_id: Uuid,
    pub company_id: Uuid,
    pub kind: DocumentKind,
    pub number: String,
    pub counterparty_name: String,
    pub document_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: DocumentStatus,
    pub version: i64,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl AllocatableDocument {
    /// Outstanding balance. Never negative for a well-formed document.
    pub fn balance_due(&self) -> Decimal {
        self.total_amount - self.amount_paid
    }
}

/// Input for creating a document.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateDocument {
    pub company_id: Uuid,
    pub kind: DocumentKind,
    #[validate(length(min = 1, max = 64))]
    pub number: String,
    #[validate(length(min = 1, max = 128))]
    pub counterparty_name: String,
    pub document_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub metadata: Option<serde_json::Value>,
}

/// Filter parameters for listing documents.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    pub kind: Option<DocumentKind>,
    pub status: Option<DocumentStatus>,
    pub limit: i32,
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            kind: None,
            status: None,
            limit: 50,
        }
    }
}
