//! Shared helpers for ledger engine tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use ledger_engine::models::{
    Account, AccountType, CreateAccount, CreatePeriod, Direction, EntryWithLines, LineInput,
    PostJournalEntry,
};
use ledger_engine::services::{BalanceCalculator, ClosingEngine, Ledger};
use ledger_engine::store::MemLedgerStore;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct TestLedger {
    pub ledger: Ledger<MemLedgerStore>,
    pub balances: BalanceCalculator<MemLedgerStore>,
    pub closing: ClosingEngine<MemLedgerStore>,
    pub company_id: Uuid,
}

/// Build a fresh ledger over an in-memory store.
pub fn spawn_ledger() -> TestLedger {
    let store = Arc::new(MemLedgerStore::new());
    TestLedger {
        ledger: Ledger::new(store.clone()),
        balances: BalanceCalculator::new(store.clone()),
        closing: ClosingEngine::new(store),
        company_id: Uuid::new_v4(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub async fn create_test_account(
    t: &TestLedger,
    account_type: AccountType,
    code: &str,
) -> Account {
    t.ledger
        .create_account(&CreateAccount {
            company_id: t.company_id,
            code: code.to_string(),
            name: format!("{code} account"),
            account_type,
            metadata: None,
        })
        .await
        .expect("create account")
}

/// Post a two-line entry: debit one account, credit another.
pub async fn post_simple_entry(
    t: &TestLedger,
    debit_account: Uuid,
    credit_account: Uuid,
    amount: &str,
    transaction_date: NaiveDate,
) -> EntryWithLines {
    t.ledger
        .post_entry(&simple_entry(
            t.company_id,
            debit_account,
            credit_account,
            amount,
            transaction_date,
        ))
        .await
        .expect("post entry")
}

pub fn simple_entry(
    company_id: Uuid,
    debit_account: Uuid,
    credit_account: Uuid,
    amount: &str,
    transaction_date: NaiveDate,
) -> PostJournalEntry {
    PostJournalEntry {
        company_id,
        reference: format!("JE-{}", &Uuid::new_v4().to_string()[..8]),
        transaction_date,
        description: "test entry".to_string(),
        created_by: "tests".to_string(),
        lines: vec![
            LineInput {
                account_id: debit_account,
                description: None,
                amount: dec(amount),
                direction: Direction::Debit,
            },
            LineInput {
                account_id: credit_account,
                description: None,
                amount: dec(amount),
                direction: Direction::Credit,
            },
        ],
    }
}

/// Create a calendar-year accounting period.
pub async fn create_calendar_period(t: &TestLedger, fiscal_year: i32) {
    t.ledger
        .create_period(&CreatePeriod {
            company_id: t.company_id,
            fiscal_year,
            fiscal_year_start: date(fiscal_year, 1, 1),
            fiscal_year_end: date(fiscal_year, 12, 31),
        })
        .await
        .expect("create period");
}
