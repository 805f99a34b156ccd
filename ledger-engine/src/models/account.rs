//! Account model for the double-entry ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Account types following standard accounting categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "asset" => Some(Self::Asset),
            "liability" => Some(Self::Liability),
            "equity" => Some(Self::Equity),
            "revenue" => Some(Self::Revenue),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }

    /// Whether the account accumulates value on the debit side.
    /// Asset/Expense are debit-normal; Liability/Equity/Revenue are
    /// credit-normal.
    pub fn is_debit_normal(&self) -> bool {
        matches!(self, Self::Asset | Self::Expense)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger account.
///
/// Code and type are immutable once the account is referenced by a posted
/// line; only name and is_active may change afterwards.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub company_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub is_active: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAccount {
    pub company_id: Uuid,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub account_type: AccountType,
    pub metadata: Option<serde_json::Value>,
}

/// Input for updating an account (name and active flag only).
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateAccount {
    #[validate(length(min = 1, max = 128))]
    pub name: Option<String>,
    pub is_active: Option<bool>,
}
