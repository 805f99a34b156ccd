//! In-process ledger store.
//!
//! Backs the test suites and embedded callers. A single mutex guards the
//! whole data set, so every multi-row write is atomic by construction.

use std::collections::HashMap;
use std::sync::Mutex;

use accounting_core::error::AppError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{
    Account, AccountType, AccountingPeriod, EntryFilter, EntryWithLines, JournalEntry,
    JournalEntryLine, JournalStatus, UpdateAccount, YearEndClose,
};
use crate::store::{BalanceScope, LedgerStore};

#[derive(Default)]
struct MemState {
    accounts: HashMap<Uuid, Account>,
    entries: HashMap<Uuid, JournalEntry>,
    lines_by_entry: HashMap<Uuid, Vec<JournalEntryLine>>,
    periods: Vec<AccountingPeriod>,
    closes: Vec<YearEndClose>,
}

/// Memory-backed [`LedgerStore`].
#[derive(Default)]
pub struct MemLedgerStore {
    state: Mutex<MemState>,
}

impl MemLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

#[async_trait]
impl LedgerStore for MemLedgerStore {
    async fn insert_account(&self, account: Account) -> Result<Account, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let duplicate = state
            .accounts
            .values()
            .any(|a| a.company_id == account.company_id && a.code == account.code);
        if duplicate {
            return Err(AppError::StateConflict(anyhow::anyhow!(
                "Account with code '{}' already exists for company",
                account.code
            )));
        }
        state.accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn get_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        Ok(state
            .accounts
            .get(&account_id)
            .filter(|a| a.company_id == company_id)
            .cloned())
    }

    async fn accounts_by_ids(
        &self,
        company_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<Account>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        Ok(account_ids
            .iter()
            .filter_map(|id| state.accounts.get(id))
            .filter(|a| a.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn list_accounts(
        &self,
        company_id: Uuid,
        account_type: Option<AccountType>,
        active_only: bool,
    ) -> Result<Vec<Account>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.company_id == company_id)
            .filter(|a| account_type.is_none_or(|t| a.account_type == t))
            .filter(|a| !active_only || a.is_active)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn update_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        update: &UpdateAccount,
    ) -> Result<Option<Account>, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let Some(account) = state
            .accounts
            .get_mut(&account_id)
            .filter(|a| a.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            account.name = name.clone();
        }
        if let Some(is_active) = update.is_active {
            account.is_active = is_active;
        }
        Ok(Some(account.clone()))
    }

    async fn insert_entry(
        &self,
        entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<EntryWithLines, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        state.entries.insert(entry.entry_id, entry.clone());
        state.lines_by_entry.insert(entry.entry_id, lines.clone());
        Ok(EntryWithLines { entry, lines })
    }

    async fn get_entry(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<EntryWithLines>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        let Some(entry) = state
            .entries
            .get(&entry_id)
            .filter(|e| e.company_id == company_id)
        else {
            return Ok(None);
        };
        let lines = state
            .lines_by_entry
            .get(&entry_id)
            .cloned()
            .unwrap_or_default();
        Ok(Some(EntryWithLines {
            entry: entry.clone(),
            lines,
        }))
    }

    async fn list_entries(
        &self,
        company_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<EntryWithLines>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        let limit = filter.limit.clamp(1, 100) as usize;
        let mut entries: Vec<&JournalEntry> = state
            .entries
            .values()
            .filter(|e| e.company_id == company_id)
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .filter(|e| in_range(e.transaction_date, filter.start_date, filter.end_date))
            .filter(|e| {
                filter.account_id.is_none_or(|account_id| {
                    state
                        .lines_by_entry
                        .get(&e.entry_id)
                        .is_some_and(|lines| lines.iter().any(|l| l.account_id == account_id))
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            b.transaction_date
                .cmp(&a.transaction_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|e| EntryWithLines {
                entry: e.clone(),
                lines: state
                    .lines_by_entry
                    .get(&e.entry_id)
                    .cloned()
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn mark_posted(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let Some(entry) = state
            .entries
            .get_mut(&entry_id)
            .filter(|e| e.company_id == company_id && e.status == JournalStatus::Draft)
        else {
            return Ok(None);
        };
        entry.status = JournalStatus::Posted;
        entry.posted_utc = Some(Utc::now());
        Ok(Some(entry.clone()))
    }

    async fn mark_voided(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let Some(entry) = state
            .entries
            .get_mut(&entry_id)
            .filter(|e| e.company_id == company_id && e.status == JournalStatus::Posted)
        else {
            return Ok(None);
        };
        entry.status = JournalStatus::Voided;
        entry.voided_utc = Some(Utc::now());
        Ok(Some(entry.clone()))
    }

    async fn delete_draft(&self, company_id: Uuid, entry_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let is_draft = state
            .entries
            .get(&entry_id)
            .is_some_and(|e| e.company_id == company_id && e.status == JournalStatus::Draft);
        if !is_draft {
            return Ok(false);
        }
        state.entries.remove(&entry_id);
        state.lines_by_entry.remove(&entry_id);
        Ok(true)
    }

    async fn lines_for_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        scope: BalanceScope,
    ) -> Result<Vec<JournalEntryLine>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        let mut lines = Vec::new();
        for entry in state.entries.values() {
            if entry.company_id != company_id
                || entry.status != JournalStatus::Posted
                || !in_range(entry.transaction_date, start_date, end_date)
            {
                continue;
            }
            if scope == BalanceScope::Operating && entry.is_closing_entry {
                continue;
            }
            if let Some(entry_lines) = state.lines_by_entry.get(&entry.entry_id) {
                lines.extend(
                    entry_lines
                        .iter()
                        .filter(|l| l.account_id == account_id)
                        .cloned(),
                );
            }
        }
        Ok(lines)
    }

    async fn insert_period(
        &self,
        period: AccountingPeriod,
    ) -> Result<AccountingPeriod, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let duplicate = state
            .periods
            .iter()
            .any(|p| p.company_id == period.company_id && p.fiscal_year == period.fiscal_year);
        if duplicate {
            return Err(AppError::StateConflict(anyhow::anyhow!(
                "Accounting period for fiscal year {} already exists",
                period.fiscal_year
            )));
        }
        state.periods.push(period.clone());
        Ok(period)
    }

    async fn get_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        Ok(state
            .periods
            .iter()
            .find(|p| p.company_id == company_id && p.fiscal_year == fiscal_year)
            .cloned())
    }

    async fn period_containing(
        &self,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        Ok(state
            .periods
            .iter()
            .find(|p| p.company_id == company_id && p.contains(date))
            .cloned())
    }

    async fn set_period_locked(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
        locked: bool,
        closing_date: Option<NaiveDate>,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let Some(period) = state
            .periods
            .iter_mut()
            .find(|p| p.company_id == company_id && p.fiscal_year == fiscal_year)
        else {
            return Ok(None);
        };
        period.is_locked = locked;
        period.closing_date = closing_date;
        Ok(Some(period.clone()))
    }

    async fn get_year_end_close(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<YearEndClose>, AppError> {
        let state = self.state.lock().expect("ledger store poisoned");
        Ok(state
            .closes
            .iter()
            .find(|c| c.company_id == company_id && c.fiscal_year == fiscal_year)
            .cloned())
    }

    async fn record_year_end_close(
        &self,
        close: YearEndClose,
        entry: Option<(JournalEntry, Vec<JournalEntryLine>)>,
        lock_period: bool,
    ) -> Result<YearEndClose, AppError> {
        let mut state = self.state.lock().expect("ledger store poisoned");
        let duplicate = state
            .closes
            .iter()
            .any(|c| c.company_id == close.company_id && c.fiscal_year == close.fiscal_year);
        if duplicate {
            return Err(AppError::StateConflict(anyhow::anyhow!(
                "Fiscal year {} is already closed",
                close.fiscal_year
            )));
        }
        if let Some((entry, lines)) = entry {
            state.lines_by_entry.insert(entry.entry_id, lines);
            state.entries.insert(entry.entry_id, entry);
        }
        if lock_period {
            let closing_date = Some(close.close_date);
            if let Some(period) = state
                .periods
                .iter_mut()
                .find(|p| p.company_id == close.company_id && p.fiscal_year == close.fiscal_year)
            {
                period.is_locked = true;
                period.closing_date = closing_date;
            }
        }
        state.closes.push(close.clone());
        Ok(close)
    }
}
