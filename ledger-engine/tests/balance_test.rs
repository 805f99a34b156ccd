//! Balance query tests.

mod common;

use common::{create_test_account, date, dec, post_simple_entry, spawn_ledger};
use ledger_engine::error::LedgerError;
use ledger_engine::models::AccountType;
use ledger_engine::store::BalanceScope;
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn balance_reflects_account_type() {
    let t = spawn_ledger();

    let asset = create_test_account(&t, AccountType::Asset, "ASSET").await;
    let liability = create_test_account(&t, AccountType::Liability, "LIABILITY").await;
    let equity = create_test_account(&t, AccountType::Equity, "EQUITY").await;
    let revenue = create_test_account(&t, AccountType::Revenue, "REVENUE").await;
    let expense = create_test_account(&t, AccountType::Expense, "EXPENSE").await;

    // Owner investment, a sale, an expense payment, a loan.
    post_simple_entry(&t, asset.account_id, equity.account_id, "1000.00", date(2026, 1, 2)).await;
    post_simple_entry(&t, asset.account_id, revenue.account_id, "500.00", date(2026, 1, 5)).await;
    post_simple_entry(&t, expense.account_id, asset.account_id, "200.00", date(2026, 1, 8)).await;
    post_simple_entry(&t, asset.account_id, liability.account_id, "300.00", date(2026, 1, 9)).await;

    let bal = |account_id| {
        t.balances
            .balance_as_of(t.company_id, account_id, None, BalanceScope::Cumulative)
    };

    // Asset: +1000 +500 -200 +300 (debits increase, credits decrease)
    assert_eq!(bal(asset.account_id).await.unwrap(), dec("1600.00"));
    // Credit-normal accounts increase with credits.
    assert_eq!(bal(equity.account_id).await.unwrap(), dec("1000.00"));
    assert_eq!(bal(revenue.account_id).await.unwrap(), dec("500.00"));
    assert_eq!(bal(liability.account_id).await.unwrap(), dec("300.00"));
    // Expense: debit-normal.
    assert_eq!(bal(expense.account_id).await.unwrap(), dec("200.00"));
}

#[tokio::test]
async fn balance_as_of_historical_date() {
    let t = spawn_ledger();
    let cash = create_test_account(&t, AccountType::Asset, "CASH").await;
    let revenue = create_test_account(&t, AccountType::Revenue, "REVENUE").await;

    post_simple_entry(&t, cash.account_id, revenue.account_id, "100.00", date(2026, 1, 10)).await;
    post_simple_entry(&t, cash.account_id, revenue.account_id, "200.00", date(2026, 1, 15)).await;
    post_simple_entry(&t, cash.account_id, revenue.account_id, "50.00", date(2026, 1, 20)).await;

    let bal = |as_of| {
        t.balances.balance_as_of(
            t.company_id,
            cash.account_id,
            Some(as_of),
            BalanceScope::Cumulative,
        )
    };

    assert_eq!(bal(date(2026, 1, 12)).await.unwrap(), dec("100.00"));
    assert_eq!(bal(date(2026, 1, 16)).await.unwrap(), dec("300.00"));
    assert_eq!(bal(date(2026, 1, 25)).await.unwrap(), dec("350.00"));
}

#[tokio::test]
async fn balance_between_range() {
    let t = spawn_ledger();
    let cash = create_test_account(&t, AccountType::Asset, "CASH").await;
    let revenue = create_test_account(&t, AccountType::Revenue, "REVENUE").await;

    post_simple_entry(&t, cash.account_id, revenue.account_id, "100.00", date(2025, 12, 30)).await;
    post_simple_entry(&t, cash.account_id, revenue.account_id, "200.00", date(2026, 1, 15)).await;
    post_simple_entry(&t, cash.account_id, revenue.account_id, "50.00", date(2026, 2, 1)).await;

    // Only January activity.
    let balance = t
        .balances
        .balance_between(
            t.company_id,
            revenue.account_id,
            date(2026, 1, 1),
            date(2026, 1, 31),
            BalanceScope::Operating,
        )
        .await
        .unwrap();
    assert_eq!(balance, dec("200.00"));
}

#[tokio::test]
async fn balance_zero_without_transactions() {
    let t = spawn_ledger();
    let cash = create_test_account(&t, AccountType::Asset, "CASH").await;

    let balance = t
        .balances
        .balance_as_of(t.company_id, cash.account_id, None, BalanceScope::Cumulative)
        .await
        .unwrap();
    assert_eq!(balance, Decimal::ZERO);
}

#[tokio::test]
async fn balance_unknown_account() {
    let t = spawn_ledger();
    let err = t
        .balances
        .balance_as_of(t.company_id, Uuid::new_v4(), None, BalanceScope::Cumulative)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(_)));
}

#[tokio::test]
async fn net_income_over_range() {
    let t = spawn_ledger();
    let cash = create_test_account(&t, AccountType::Asset, "CASH").await;
    let sales = create_test_account(&t, AccountType::Revenue, "SALES").await;
    let fees = create_test_account(&t, AccountType::Revenue, "FEES").await;
    let rent = create_test_account(&t, AccountType::Expense, "RENT").await;

    post_simple_entry(&t, cash.account_id, sales.account_id, "900.00", date(2026, 3, 1)).await;
    post_simple_entry(&t, cash.account_id, fees.account_id, "100.00", date(2026, 3, 10)).await;
    post_simple_entry(&t, rent.account_id, cash.account_id, "400.00", date(2026, 3, 20)).await;

    let net = t
        .balances
        .net_income(t.company_id, date(2026, 1, 1), date(2026, 12, 31))
        .await
        .unwrap();
    assert_eq!(net.total_revenue, dec("1000.00"));
    assert_eq!(net.total_expenses, dec("400.00"));
    assert_eq!(net.net_income, dec("600.00"));
}
