//! Posting, voiding, and period management.
//!
//! All writes funnel through here: the service validates, the store
//! persists. Period-lock enforcement lives in [`Ledger::assert_period_open`]
//! and nowhere else.

use std::sync::Arc;

use accounting_core::error::AppError;
use accounting_core::money::is_settled;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::models::{
    Account, AccountType, AccountingPeriod, CreateAccount, CreatePeriod, Direction, EntryFilter,
    EntryWithLines, JournalEntry, JournalEntryLine, JournalStatus, PostJournalEntry,
    UpdateAccount,
};
use crate::services::metrics::{ACCOUNTS_CREATED, ENTRIES_POSTED_TOTAL};
use crate::store::{BalanceScope, LedgerStore};

/// The ledger service: account registry plus journal entry lifecycle.
pub struct Ledger<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(company_id = %input.company_id, code = %input.code))]
    pub async fn create_account(&self, input: &CreateAccount) -> Result<Account, LedgerError> {
        input.validate()?;

        let account = Account {
            account_id: Uuid::new_v4(),
            company_id: input.company_id,
            code: input.code.clone(),
            name: input.name.clone(),
            account_type: input.account_type,
            is_active: true,
            metadata: input.metadata.clone(),
            created_utc: Utc::now(),
        };

        let account = self.store.insert_account(account).await?;
        ACCOUNTS_CREATED
            .with_label_values(&[account.account_type.as_str()])
            .inc();
        Ok(account)
    }

    pub async fn get_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
    ) -> Result<Account, LedgerError> {
        self.store
            .get_account(company_id, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    pub async fn list_accounts(
        &self,
        company_id: Uuid,
        account_type: Option<AccountType>,
        active_only: bool,
    ) -> Result<Vec<Account>, LedgerError> {
        Ok(self
            .store
            .list_accounts(company_id, account_type, active_only)
            .await?)
    }

    #[instrument(skip(self, update), fields(company_id = %company_id, account_id = %account_id))]
    pub async fn update_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        update: &UpdateAccount,
    ) -> Result<Account, LedgerError> {
        update.validate()?;
        self.store
            .update_account(company_id, account_id, update)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Deactivate an account. Refused while the account still carries a
    /// balance; zero it out with a journal entry first.
    #[instrument(skip(self), fields(company_id = %company_id, account_id = %account_id))]
    pub async fn deactivate_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
    ) -> Result<Account, LedgerError> {
        let account = self.get_account(company_id, account_id).await?;
        let lines = self
            .store
            .lines_for_account(company_id, account_id, None, None, BalanceScope::Cumulative)
            .await?;
        let raw: Decimal = lines.iter().map(|l| l.signed_amount()).sum();
        let balance = if account.account_type.is_debit_normal() {
            raw
        } else {
            -raw
        };
        if !is_settled(balance) {
            return Err(LedgerError::AccountInUse {
                account_id,
                balance,
            });
        }
        let update = UpdateAccount {
            name: None,
            is_active: Some(false),
        };
        self.store
            .update_account(company_id, account_id, &update)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    // -------------------------------------------------------------------------
    // Journal entries
    // -------------------------------------------------------------------------

    /// Validate and post a journal entry in one step.
    #[instrument(skip(self, input), fields(company_id = %input.company_id, reference = %input.reference))]
    pub async fn post_entry(&self, input: &PostJournalEntry) -> Result<EntryWithLines, LedgerError> {
        let result = self.post_entry_inner(input).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        ENTRIES_POSTED_TOTAL.with_label_values(&[status]).inc();
        result
    }

    async fn post_entry_inner(
        &self,
        input: &PostJournalEntry,
    ) -> Result<EntryWithLines, LedgerError> {
        input.validate()?;

        let entry_id = Uuid::new_v4();
        let lines = self.build_lines(input, entry_id)?;
        self.check_balanced(&lines)?;
        self.check_accounts(input.company_id, &lines).await?;
        self.assert_period_open(input.company_id, input.transaction_date)
            .await?;

        let now = Utc::now();
        let entry = JournalEntry {
            entry_id,
            company_id: input.company_id,
            reference: input.reference.clone(),
            transaction_date: input.transaction_date,
            description: input.description.clone(),
            status: JournalStatus::Posted,
            is_closing_entry: false,
            created_by: input.created_by.clone(),
            created_utc: now,
            posted_utc: Some(now),
            voided_utc: None,
        };

        let posted = self.store.insert_entry(entry, lines).await?;
        info!(
            entry_id = %posted.entry.entry_id,
            reference = %posted.entry.reference,
            line_count = posted.lines.len(),
            "Journal entry posted"
        );
        Ok(posted)
    }

    /// Save an entry as a draft. Drafts may be unbalanced; everything is
    /// revalidated when the draft is posted.
    #[instrument(skip(self, input), fields(company_id = %input.company_id, reference = %input.reference))]
    pub async fn save_draft(&self, input: &PostJournalEntry) -> Result<EntryWithLines, LedgerError> {
        input.validate()?;

        let entry_id = Uuid::new_v4();
        let lines = self.build_lines(input, entry_id)?;
        self.check_accounts(input.company_id, &lines).await?;

        let entry = JournalEntry {
            entry_id,
            company_id: input.company_id,
            reference: input.reference.clone(),
            transaction_date: input.transaction_date,
            description: input.description.clone(),
            status: JournalStatus::Draft,
            is_closing_entry: false,
            created_by: input.created_by.clone(),
            created_utc: Utc::now(),
            posted_utc: None,
            voided_utc: None,
        };

        Ok(self.store.insert_entry(entry, lines).await?)
    }

    /// Post a previously saved draft, revalidating everything at posting
    /// time.
    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    pub async fn post_draft(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<EntryWithLines, LedgerError> {
        let found = self
            .store
            .get_entry(company_id, entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if found.entry.status != JournalStatus::Draft {
            return Err(LedgerError::InvalidStatus {
                entry_id,
                status: found.entry.status.to_string(),
                expected: JournalStatus::Draft.to_string(),
            });
        }

        self.check_balanced(&found.lines)?;
        self.check_accounts(company_id, &found.lines).await?;
        self.assert_period_open(company_id, found.entry.transaction_date)
            .await?;

        let entry = self
            .store
            .mark_posted(company_id, entry_id)
            .await?
            .ok_or_else(|| {
                LedgerError::Storage(AppError::ConcurrentModification(anyhow::anyhow!(
                    "journal entry {} changed while posting",
                    entry_id
                )))
            })?;
        ENTRIES_POSTED_TOTAL.with_label_values(&["ok"]).inc();

        Ok(EntryWithLines {
            entry,
            lines: found.lines,
        })
    }

    /// Void a posted entry. The lines stay on record but stop counting
    /// toward every balance. Refused inside a locked period.
    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    pub async fn void_entry(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<JournalEntry, LedgerError> {
        let found = self
            .store
            .get_entry(company_id, entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if found.entry.status != JournalStatus::Posted {
            return Err(LedgerError::InvalidStatus {
                entry_id,
                status: found.entry.status.to_string(),
                expected: JournalStatus::Posted.to_string(),
            });
        }

        self.assert_period_open(company_id, found.entry.transaction_date)
            .await?;

        self.store
            .mark_voided(company_id, entry_id)
            .await?
            .ok_or_else(|| {
                LedgerError::Storage(AppError::ConcurrentModification(anyhow::anyhow!(
                    "journal entry {} changed while voiding",
                    entry_id
                )))
            })
    }

    /// Delete a draft. Posted entries are never deleted; void them instead.
    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    pub async fn delete_draft(&self, company_id: Uuid, entry_id: Uuid) -> Result<(), LedgerError> {
        let found = self
            .store
            .get_entry(company_id, entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if found.entry.status != JournalStatus::Draft {
            return Err(LedgerError::InvalidStatus {
                entry_id,
                status: found.entry.status.to_string(),
                expected: JournalStatus::Draft.to_string(),
            });
        }
        self.store.delete_draft(company_id, entry_id).await?;
        Ok(())
    }

    pub async fn get_entry(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<EntryWithLines, LedgerError> {
        self.store
            .get_entry(company_id, entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))
    }

    pub async fn list_entries(
        &self,
        company_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<EntryWithLines>, LedgerError> {
        Ok(self.store.list_entries(company_id, filter).await?)
    }

    // -------------------------------------------------------------------------
    // Accounting periods
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(company_id = %input.company_id, fiscal_year = input.fiscal_year))]
    pub async fn create_period(
        &self,
        input: &CreatePeriod,
    ) -> Result<AccountingPeriod, LedgerError> {
        if input.fiscal_year_start > input.fiscal_year_end {
            return Err(LedgerError::InvalidPeriod {
                start: input.fiscal_year_start,
                end: input.fiscal_year_end,
            });
        }
        let period = AccountingPeriod {
            period_id: Uuid::new_v4(),
            company_id: input.company_id,
            fiscal_year: input.fiscal_year,
            fiscal_year_start: input.fiscal_year_start,
            fiscal_year_end: input.fiscal_year_end,
            is_locked: false,
            closing_date: None,
        };
        Ok(self.store.insert_period(period).await?)
    }

    pub async fn get_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<AccountingPeriod, LedgerError> {
        self.store
            .get_period(company_id, fiscal_year)
            .await?
            .ok_or(LedgerError::PeriodNotFound(fiscal_year))
    }

    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    pub async fn lock_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<AccountingPeriod, LedgerError> {
        let period = self.get_period(company_id, fiscal_year).await?;
        self.store
            .set_period_locked(
                company_id,
                fiscal_year,
                true,
                Some(period.fiscal_year_end),
            )
            .await?
            .ok_or(LedgerError::PeriodNotFound(fiscal_year))
    }

    /// Unlock a period. Refused once the fiscal year has been closed, so a
    /// closed-and-locked year cannot silently reopen.
    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    pub async fn unlock_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<AccountingPeriod, LedgerError> {
        if self
            .store
            .get_year_end_close(company_id, fiscal_year)
            .await?
            .is_some()
        {
            return Err(LedgerError::UnlockAfterClose(fiscal_year));
        }
        self.store
            .set_period_locked(company_id, fiscal_year, false, None)
            .await?
            .ok_or(LedgerError::PeriodNotFound(fiscal_year))
    }

    /// The central period-lock guard. Every write that carries a
    /// transaction date goes through here.
    pub async fn assert_period_open(
        &self,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<(), LedgerError> {
        if let Some(period) = self.store.period_containing(company_id, date).await? {
            if period.is_locked {
                return Err(LedgerError::PeriodLocked {
                    date,
                    fiscal_year: period.fiscal_year,
                });
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validation helpers
    // -------------------------------------------------------------------------

    fn build_lines(
        &self,
        input: &PostJournalEntry,
        entry_id: Uuid,
    ) -> Result<Vec<JournalEntryLine>, LedgerError> {
        if input.lines.len() < 2 {
            return Err(LedgerError::EmptyEntry);
        }
        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            if line.amount <= Decimal::ZERO {
                return Err(LedgerError::NonPositiveLineAmount {
                    amount: line.amount,
                });
            }
            let (debit, credit) = match line.direction {
                Direction::Debit => (line.amount, Decimal::ZERO),
                Direction::Credit => (Decimal::ZERO, line.amount),
            };
            lines.push(JournalEntryLine {
                line_id: Uuid::new_v4(),
                entry_id,
                account_id: line.account_id,
                description: line.description.clone(),
                debit,
                credit,
            });
        }
        Ok(lines)
    }

    fn check_balanced(&self, lines: &[JournalEntryLine]) -> Result<(), LedgerError> {
        let debits: Decimal = lines.iter().map(|l| l.debit).sum();
        let credits: Decimal = lines.iter().map(|l| l.credit).sum();
        if debits != credits {
            return Err(LedgerError::Unbalanced { debits, credits });
        }
        Ok(())
    }

    async fn check_accounts(
        &self,
        company_id: Uuid,
        lines: &[JournalEntryLine],
    ) -> Result<(), LedgerError> {
        let account_ids: Vec<Uuid> = lines.iter().map(|l| l.account_id).collect();
        let accounts = self.store.accounts_by_ids(company_id, &account_ids).await?;
        for id in &account_ids {
            let known = accounts
                .iter()
                .any(|a| a.account_id == *id && a.is_active);
            if !known {
                return Err(LedgerError::UnknownAccount(*id));
            }
        }
        Ok(())
    }
}
