//! Journal entry and line models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Line direction (debit or credit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Journal entry lifecycle status.
///
/// Posted entries are immutable; the only legal transition out of Posted
/// is Voided. Corrections are new entries, never edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JournalStatus {
    Draft,
    Posted,
    Voided,
}

impl JournalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Voided => "voided",
        }
    }
}

impl std::fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Journal entry header.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub company_id: Uuid,
    pub reference: String,
    pub transaction_date: NaiveDate,
    pub description: String,
    pub status: JournalStatus,
    /// Set only by the closing engine; balance queries in Operating scope
    /// filter these entries out.
    pub is_closing_entry: bool,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
    pub posted_utc: Option<DateTime<Utc>>,
    pub voided_utc: Option<DateTime<Utc>>,
}

/// Single journal entry line.
///
/// At most one of debit/credit is non-zero; the parent entry's lines sum
/// to equal debits and credits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JournalEntryLine {
    pub line_id: Uuid,
    pub entry_id: Uuid,
    pub account_id: Uuid,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl JournalEntryLine {
    /// Signed amount (positive for debit, negative for credit).
    pub fn signed_amount(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A journal entry together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryWithLines {
    pub entry: JournalEntry,
    pub lines: Vec<JournalEntryLine>,
}

/// Input for one line of a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineInput {
    pub account_id: Uuid,
    #[validate(length(max = 256))]
    pub description: Option<String>,
    pub amount: Decimal,
    pub direction: Direction,
}

/// Input for posting (or drafting) a journal entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PostJournalEntry {
    pub company_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub reference: String,
    pub transaction_date: NaiveDate,
    #[validate(length(max = 512))]
    pub description: String,
    #[validate(length(min = 1, max = 64))]
    pub created_by: String,
    #[validate(nested)]
    pub lines: Vec<LineInput>,
}

/// Filter parameters for listing journal entries.
#[derive(Debug, Clone)]
pub struct EntryFilter {
    pub account_id: Option<Uuid>,
    pub status: Option<JournalStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: i32,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            account_id: None,
            status: None,
            start_date: None,
            end_date: None,
            limit: 50,
        }
    }
}
