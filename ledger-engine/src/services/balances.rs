//! Balance calculation over posted ledger lines.
//!
//! Balances are sign-normalized by account type: debit-normal accounts
//! (Asset/Expense) report debits minus credits, credit-normal accounts
//! (Liability/Equity/Revenue) the reverse.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Account, AccountType, JournalEntryLine};
use crate::store::{BalanceScope, LedgerStore};

/// Revenue and expense totals over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetIncome {
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

/// An account with its calculated balance.
#[derive(Debug, Clone)]
pub struct AccountBalance {
    pub account: Account,
    pub balance: Decimal,
}

/// Read-side balance queries.
pub struct BalanceCalculator<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> BalanceCalculator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Account balance up to and including `as_of` (entire history when
    /// None).
    #[instrument(skip(self), fields(company_id = %company_id, account_id = %account_id))]
    pub async fn balance_as_of(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        as_of: Option<NaiveDate>,
        scope: BalanceScope,
    ) -> Result<Decimal, LedgerError> {
        self.balance_in_range(company_id, account_id, None, as_of, scope)
            .await
    }

    /// Account balance over a closed date range.
    #[instrument(skip(self), fields(company_id = %company_id, account_id = %account_id))]
    pub async fn balance_between(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        scope: BalanceScope,
    ) -> Result<Decimal, LedgerError> {
        self.balance_in_range(company_id, account_id, Some(start_date), Some(end_date), scope)
            .await
    }

    async fn balance_in_range(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        scope: BalanceScope,
    ) -> Result<Decimal, LedgerError> {
        let account = self
            .store
            .get_account(company_id, account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let lines = self
            .store
            .lines_for_account(company_id, account_id, start_date, end_date, scope)
            .await?;
        Ok(normalized(account.account_type, &lines))
    }

    /// Operating net income over a date range. Closing entries are always
    /// excluded here; this is the preview/statement view, not the
    /// cumulative one.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn net_income(
        &self,
        company_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<NetIncome, LedgerError> {
        let mut total_revenue = Decimal::ZERO;
        for account in self
            .store
            .list_accounts(company_id, Some(AccountType::Revenue), false)
            .await?
        {
            total_revenue += self
                .balance_between(
                    company_id,
                    account.account_id,
                    start_date,
                    end_date,
                    BalanceScope::Operating,
                )
                .await?;
        }

        let mut total_expenses = Decimal::ZERO;
        for account in self
            .store
            .list_accounts(company_id, Some(AccountType::Expense), false)
            .await?
        {
            total_expenses += self
                .balance_between(
                    company_id,
                    account.account_id,
                    start_date,
                    end_date,
                    BalanceScope::Operating,
                )
                .await?;
        }

        Ok(NetIncome {
            total_revenue,
            total_expenses,
            net_income: total_revenue - total_expenses,
        })
    }

    /// Every account with its cumulative balance as of a date. Over any
    /// posted ledger the debit-normal and credit-normal sides sum equal.
    #[instrument(skip(self), fields(company_id = %company_id))]
    pub async fn trial_balance(
        &self,
        company_id: Uuid,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<AccountBalance>, LedgerError> {
        let accounts = self.store.list_accounts(company_id, None, false).await?;
        let mut result = Vec::with_capacity(accounts.len());
        for account in accounts {
            let balance = self
                .balance_as_of(
                    company_id,
                    account.account_id,
                    as_of,
                    BalanceScope::Cumulative,
                )
                .await?;
            result.push(AccountBalance { account, balance });
        }
        Ok(result)
    }
}

fn normalized(account_type: AccountType, lines: &[JournalEntryLine]) -> Decimal {
    let raw: Decimal = lines.iter().map(|l| l.signed_amount()).sum();
    if account_type.is_debit_normal() {
        raw
    } else {
        -raw
    }
}
