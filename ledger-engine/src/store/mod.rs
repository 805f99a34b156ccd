//! Ledger persistence seam.
//!
//! The engines own all validation and arithmetic; a [`LedgerStore`] only
//! persists and retrieves, and guarantees the atomic writes the contracts
//! need (entry + lines together, close + entry + lock together).

mod memory;
mod postgres;

pub use memory::MemLedgerStore;
pub use postgres::PgLedgerStore;

use accounting_core::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{
    Account, AccountType, AccountingPeriod, EntryFilter, EntryWithLines, JournalEntry,
    JournalEntryLine, UpdateAccount, YearEndClose,
};

/// Which entries a balance query sees.
///
/// Operating excludes closing entries (net-income previews, statements);
/// Cumulative includes them (year-over-year account balances). The two
/// modes are never conflated implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceScope {
    Operating,
    Cumulative,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Accounts

    /// Insert a new account. Duplicate (company, code) is a StateConflict.
    async fn insert_account(&self, account: Account) -> Result<Account, AppError>;

    async fn get_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError>;

    async fn accounts_by_ids(
        &self,
        company_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<Account>, AppError>;

    async fn list_accounts(
        &self,
        company_id: Uuid,
        account_type: Option<AccountType>,
        active_only: bool,
    ) -> Result<Vec<Account>, AppError>;

    async fn update_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        update: &UpdateAccount,
    ) -> Result<Option<Account>, AppError>;

    // Journal entries

    /// Persist an entry and all of its lines atomically.
    async fn insert_entry(
        &self,
        entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<EntryWithLines, AppError>;

    async fn get_entry(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<EntryWithLines>, AppError>;

    async fn list_entries(
        &self,
        company_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<EntryWithLines>, AppError>;

    /// Conditionally transition a draft entry to posted. Returns None when
    /// the entry is missing or no longer a draft.
    async fn mark_posted(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError>;

    /// Conditionally transition a posted entry to voided. Returns None when
    /// the entry is missing or not posted.
    async fn mark_voided(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError>;

    /// Delete a draft entry and its lines. Posted entries are never deleted.
    async fn delete_draft(&self, company_id: Uuid, entry_id: Uuid) -> Result<bool, AppError>;

    /// Posted lines for an account within an optional date range, scope-
    /// filtered. Voided and draft entries never appear here.
    async fn lines_for_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        scope: BalanceScope,
    ) -> Result<Vec<JournalEntryLine>, AppError>;

    // Accounting periods

    /// Insert a period. Duplicate (company, fiscal_year) is a StateConflict.
    async fn insert_period(&self, period: AccountingPeriod)
        -> Result<AccountingPeriod, AppError>;

    async fn get_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<AccountingPeriod>, AppError>;

    async fn period_containing(
        &self,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, AppError>;

    async fn set_period_locked(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
        locked: bool,
        closing_date: Option<NaiveDate>,
    ) -> Result<Option<AccountingPeriod>, AppError>;

    // Year-end closes

    async fn get_year_end_close(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<YearEndClose>, AppError>;

    /// Record a year-end close: close row, optional closing entry with its
    /// lines, and optional period lock, all in one atomic write. A
    /// concurrent close of the same fiscal year surfaces as StateConflict.
    async fn record_year_end_close(
        &self,
        close: YearEndClose,
        entry: Option<(JournalEntry, Vec<JournalEntryLine>)>,
        lock_period: bool,
    ) -> Result<YearEndClose, AppError>;
}
