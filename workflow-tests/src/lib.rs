//! Shared fixture for cross-engine workflow tests: one company wired
//! through all three engines over in-process stores.

use std::sync::Arc;

use allocation_engine::services::Allocator;
use allocation_engine::store::MemAllocationStore;
use chrono::NaiveDate;
use ledger_engine::models::{
    Account, AccountType, CreateAccount, CreatePeriod, Direction, EntryWithLines, LineInput,
    PostJournalEntry,
};
use ledger_engine::services::{BalanceCalculator, ClosingEngine, Ledger};
use ledger_engine::store::MemLedgerStore;
use reconciliation_engine::models::{CandidateItem, ItemSource};
use reconciliation_engine::services::Reconciler;
use reconciliation_engine::store::MemReconciliationStore;
use rust_decimal::Decimal;
use uuid::Uuid;

/// One company's engines over fresh in-process stores.
pub struct Workspace {
    pub company_id: Uuid,
    pub ledger: Ledger<MemLedgerStore>,
    pub balances: BalanceCalculator<MemLedgerStore>,
    pub closing: ClosingEngine<MemLedgerStore>,
    pub allocator: Allocator<MemAllocationStore>,
    pub reconciler: Reconciler<MemReconciliationStore>,
}

impl Workspace {
    pub fn new() -> Self {
        let ledger_store = Arc::new(MemLedgerStore::new());
        Self {
            company_id: Uuid::new_v4(),
            ledger: Ledger::new(ledger_store.clone()),
            balances: BalanceCalculator::new(ledger_store.clone()),
            closing: ClosingEngine::new(ledger_store),
            allocator: Allocator::new(Arc::new(MemAllocationStore::new())),
            reconciler: Reconciler::new(Arc::new(MemReconciliationStore::new())),
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

/// The minimal chart of accounts the scenarios need.
pub struct ChartOfAccounts {
    pub cash: Account,
    pub receivables: Account,
    pub revenue: Account,
    pub rent: Account,
    pub retained_earnings: Account,
}

pub async fn chart_of_accounts(ws: &Workspace) -> ChartOfAccounts {
    ChartOfAccounts {
        cash: create_account(ws, AccountType::Asset, "1000", "Cash at bank").await,
        receivables: create_account(ws, AccountType::Asset, "1100", "Accounts receivable").await,
        revenue: create_account(ws, AccountType::Revenue, "4000", "Sales revenue").await,
        rent: create_account(ws, AccountType::Expense, "6000", "Rent expense").await,
        retained_earnings: create_account(ws, AccountType::Equity, "3900", "Retained earnings")
            .await,
    }
}

pub async fn create_account(
    ws: &Workspace,
    account_type: AccountType,
    code: &str,
    name: &str,
) -> Account {
    ws.ledger
        .create_account(&CreateAccount {
            company_id: ws.company_id,
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            metadata: None,
        })
        .await
        .expect("create account")
}

pub async fn create_calendar_period(ws: &Workspace, fiscal_year: i32) {
    ws.ledger
        .create_period(&CreatePeriod {
            company_id: ws.company_id,
            fiscal_year,
            fiscal_year_start: date(fiscal_year, 1, 1),
            fiscal_year_end: date(fiscal_year, 12, 31),
        })
        .await
        .expect("create period");
}

/// Post a two-line entry: debit one account, credit another.
pub async fn post_entry(
    ws: &Workspace,
    reference: &str,
    debit_account: Uuid,
    credit_account: Uuid,
    amount: &str,
    transaction_date: NaiveDate,
) -> EntryWithLines {
    ws.ledger
        .post_entry(&PostJournalEntry {
            company_id: ws.company_id,
            reference: reference.to_string(),
            transaction_date,
            description: format!("{reference} posting"),
            created_by: "workflow-tests".to_string(),
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
        })
        .await
        .expect("post entry")
}

/// Build reconciliation candidates from the posted ledger lines of a
/// (debit-normal) bank account: positive = money in, negative = money out.
pub async fn ledger_candidates(ws: &Workspace, bank_account_id: Uuid) -> Vec<CandidateItem> {
    let entries = ws
        .ledger
        .list_entries(
            ws.company_id,
            &ledger_engine::models::EntryFilter {
                account_id: Some(bank_account_id),
                ..Default::default()
            },
        )
        .await
        .expect("list entries");

    let mut candidates = Vec::new();
    for entry in &entries {
        for line in entry
            .lines
            .iter()
            .filter(|l| l.account_id == bank_account_id)
        {
            candidates.push(CandidateItem {
                source: ItemSource::JournalEntry,
                source_ref: entry.entry.entry_id,
                item_date: entry.entry.transaction_date,
                description: entry.entry.description.clone(),
                amount: line.signed_amount(),
            });
        }
    }
    candidates
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}
