//! Fiscal year-end closing.
//!
//! Zeroes every revenue and expense account into retained earnings with a
//! single generated journal entry, records the close, and optionally locks
//! the period. The generated entry balances by construction for either
//! sign of net income.

use std::sync::Arc;

use accounting_core::error::AppError;
use accounting_core::money::{balance_tolerance, is_settled};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{ClosingError, LedgerError};
use crate::models::{
    Account, AccountType, Direction, JournalEntry, JournalEntryLine, JournalStatus, LineInput,
    YearEndClose,
};
use crate::services::balances::BalanceCalculator;
use crate::services::metrics::YEAR_END_CLOSES_TOTAL;
use crate::store::{BalanceScope, LedgerStore};

/// One account's contribution to the close.
#[derive(Debug, Clone)]
pub struct ClosePreviewLine {
    pub account: Account,
    pub balance: Decimal,
}

/// The computed close before anything is written.
#[derive(Debug, Clone)]
pub struct ClosePreview {
    pub fiscal_year: i32,
    pub revenue: Vec<ClosePreviewLine>,
    pub expenses: Vec<ClosePreviewLine>,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

impl ClosePreview {
    /// True when no account carries a closable balance.
    pub fn is_empty(&self) -> bool {
        self.revenue.is_empty() && self.expenses.is_empty()
    }
}

/// Caller-selected close parameters.
#[derive(Debug, Clone)]
pub struct CloseOptions {
    pub retained_earnings_account_id: Uuid,
    pub lock_period: bool,
    pub created_by: String,
}

/// The period-closing engine.
pub struct ClosingEngine<S> {
    store: Arc<S>,
    balances: BalanceCalculator<S>,
}

impl<S: LedgerStore> ClosingEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            balances: BalanceCalculator::new(store.clone()),
            store,
        }
    }

    /// Compute the close without writing anything. Accounts whose balance
    /// rounds below one cent are dropped from the preview.
    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    pub async fn preview(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<ClosePreview, ClosingError> {
        let period = self
            .store
            .get_period(company_id, fiscal_year)
            .await?
            .ok_or(LedgerError::PeriodNotFound(fiscal_year))?;

        let mut revenue = Vec::new();
        let mut total_revenue = Decimal::ZERO;
        for account in self
            .store
            .list_accounts(company_id, Some(AccountType::Revenue), false)
            .await?
        {
            let balance = self
                .balances
                .balance_between(
                    company_id,
                    account.account_id,
                    period.fiscal_year_start,
                    period.fiscal_year_end,
                    BalanceScope::Operating,
                )
                .await?;
            if balance.abs() < balance_tolerance() {
                continue;
            }
            total_revenue += balance;
            revenue.push(ClosePreviewLine { account, balance });
        }

        let mut expenses = Vec::new();
        let mut total_expenses = Decimal::ZERO;
        for account in self
            .store
            .list_accounts(company_id, Some(AccountType::Expense), false)
            .await?
        {
            let balance = self
                .balances
                .balance_between(
                    company_id,
                    account.account_id,
                    period.fiscal_year_start,
                    period.fiscal_year_end,
                    BalanceScope::Operating,
                )
                .await?;
            if balance.abs() < balance_tolerance() {
                continue;
            }
            total_expenses += balance;
            expenses.push(ClosePreviewLine { account, balance });
        }

        Ok(ClosePreview {
            fiscal_year,
            revenue,
            expenses,
            total_revenue,
            total_expenses,
            net_income: total_revenue - total_expenses,
        })
    }

    /// Perform the year-end close. Idempotent-guarded: a second attempt for
    /// the same fiscal year fails with AlreadyClosed and writes nothing. A
    /// break-even year closes with zero totals and no journal entry.
    #[instrument(skip(self, options), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    pub async fn close(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
        options: &CloseOptions,
    ) -> Result<YearEndClose, ClosingError> {
        if self
            .store
            .get_year_end_close(company_id, fiscal_year)
            .await?
            .is_some()
        {
            return Err(ClosingError::AlreadyClosed(fiscal_year));
        }

        let period = self
            .store
            .get_period(company_id, fiscal_year)
            .await?
            .ok_or(LedgerError::PeriodNotFound(fiscal_year))?;
        if period.is_locked {
            return Err(ClosingError::PeriodLocked(fiscal_year));
        }

        let retained = self
            .store
            .get_account(company_id, options.retained_earnings_account_id)
            .await?
            .ok_or(ClosingError::NoRetainedEarningsAccount)?;
        if retained.account_type != AccountType::Equity || !retained.is_active {
            return Err(ClosingError::NoRetainedEarningsAccount);
        }

        let preview = self.preview(company_id, fiscal_year).await?;

        let entry = if preview.is_empty() {
            None
        } else {
            Some(self.build_closing_entry(company_id, &period.fiscal_year_end, &preview, &retained, options))
        };

        let close = YearEndClose {
            close_id: Uuid::new_v4(),
            company_id,
            fiscal_year,
            close_date: period.fiscal_year_end,
            total_revenue: preview.total_revenue,
            total_expenses: preview.total_expenses,
            net_income: preview.net_income,
            retained_earnings_account_id: retained.account_id,
            entry_id: entry.as_ref().map(|(e, _)| e.entry_id),
            created_by: options.created_by.clone(),
            created_utc: Utc::now(),
        };

        let recorded = self
            .store
            .record_year_end_close(close, entry, options.lock_period)
            .await
            .map_err(|e| match e {
                // Lost the race against a concurrent close of the same year.
                AppError::StateConflict(_) => ClosingError::AlreadyClosed(fiscal_year),
                other => ClosingError::Storage(other),
            })?;

        YEAR_END_CLOSES_TOTAL.with_label_values(&["ok"]).inc();
        info!(
            close_id = %recorded.close_id,
            fiscal_year = recorded.fiscal_year,
            total_revenue = %recorded.total_revenue,
            total_expenses = %recorded.total_expenses,
            net_income = %recorded.net_income,
            locked = options.lock_period,
            "Fiscal year closed"
        );

        Ok(recorded)
    }

    fn build_closing_entry(
        &self,
        company_id: Uuid,
        close_date: &chrono::NaiveDate,
        preview: &ClosePreview,
        retained: &Account,
        options: &CloseOptions,
    ) -> (JournalEntry, Vec<JournalEntryLine>) {
        let entry_id = Uuid::new_v4();
        let mut inputs: Vec<LineInput> = Vec::new();

        // Zero each revenue account: debit a credit-normal balance (or
        // credit a contra balance).
        for line in &preview.revenue {
            let (amount, direction) = if line.balance >= Decimal::ZERO {
                (line.balance, Direction::Debit)
            } else {
                (-line.balance, Direction::Credit)
            };
            inputs.push(LineInput {
                account_id: line.account.account_id,
                description: Some(format!("Close {}", line.account.code)),
                amount,
                direction,
            });
        }

        // Zero each expense account the opposite way.
        for line in &preview.expenses {
            let (amount, direction) = if line.balance >= Decimal::ZERO {
                (line.balance, Direction::Credit)
            } else {
                (-line.balance, Direction::Debit)
            };
            inputs.push(LineInput {
                account_id: line.account.account_id,
                description: Some(format!("Close {}", line.account.code)),
                amount,
                direction,
            });
        }

        // Balancing retained-earnings line; omitted on a dead-even year.
        if !is_settled(preview.net_income) {
            let (amount, direction) = if preview.net_income >= Decimal::ZERO {
                (preview.net_income, Direction::Credit)
            } else {
                (-preview.net_income, Direction::Debit)
            };
            inputs.push(LineInput {
                account_id: retained.account_id,
                description: Some("Net income to retained earnings".to_string()),
                amount,
                direction,
            });
        }

        let lines = inputs
            .into_iter()
            .map(|input| {
                let (debit, credit) = match input.direction {
                    Direction::Debit => (input.amount, Decimal::ZERO),
                    Direction::Credit => (Decimal::ZERO, input.amount),
                };
                JournalEntryLine {
                    line_id: Uuid::new_v4(),
                    entry_id,
                    account_id: input.account_id,
                    description: input.description,
                    debit,
                    credit,
                }
            })
            .collect();

        let now = Utc::now();
        let entry = JournalEntry {
            entry_id,
            company_id,
            reference: format!("CLOSE-{}", preview.fiscal_year),
            transaction_date: *close_date,
            description: format!("Year-end close for fiscal year {}", preview.fiscal_year),
            status: JournalStatus::Posted,
            is_closing_entry: true,
            created_by: options.created_by.clone(),
            created_utc: now,
            posted_utc: Some(now),
            voided_utc: None,
        };

        (entry, lines)
    }
}
