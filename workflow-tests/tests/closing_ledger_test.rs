//! Year-end close over a season of postings.

use ledger_engine::services::CloseOptions;
use ledger_engine::store::BalanceScope;
use rust_decimal::Decimal;
use workflow_tests::{chart_of_accounts, create_calendar_period, date, dec, post_entry, Workspace};

#[tokio::test]
async fn close_fiscal_year_into_retained_earnings() {
    let ws = Workspace::new();
    let accounts = chart_of_accounts(&ws).await;
    create_calendar_period(&ws, 2025).await;

    // A year of activity: 12 monthly sales and rent payments.
    for month in 1..=12 {
        post_entry(
            &ws,
            &format!("SALE-{month:02}"),
            accounts.cash.account_id,
            accounts.revenue.account_id,
            "1000.00",
            date(2025, month, 15),
        )
        .await;
        post_entry(
            &ws,
            &format!("RENT-{month:02}"),
            accounts.rent.account_id,
            accounts.cash.account_id,
            "650.00",
            date(2025, month, 1),
        )
        .await;
    }

    let preview = ws.closing.preview(ws.company_id, 2025).await.unwrap();
    assert_eq!(preview.total_revenue, dec("12000.00"));
    assert_eq!(preview.total_expenses, dec("7800.00"));
    assert_eq!(preview.net_income, dec("4200.00"));

    let close = ws
        .closing
        .close(
            ws.company_id,
            2025,
            &CloseOptions {
                retained_earnings_account_id: accounts.retained_earnings.account_id,
                lock_period: true,
                created_by: "workflow-tests".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(close.net_income, dec("4200.00"));

    // Revenue and expense are zeroed; retained earnings holds the year.
    for account in [&accounts.revenue, &accounts.rent] {
        let balance = ws
            .balances
            .balance_as_of(
                ws.company_id,
                account.account_id,
                None,
                BalanceScope::Cumulative,
            )
            .await
            .unwrap();
        assert_eq!(balance, Decimal::ZERO, "{} not zeroed", account.code);
    }
    let retained = ws
        .balances
        .balance_as_of(
            ws.company_id,
            accounts.retained_earnings.account_id,
            None,
            BalanceScope::Cumulative,
        )
        .await
        .unwrap();
    assert_eq!(retained, dec("4200.00"));

    // Operating net income for the closed year is still reported from the
    // pre-close activity; the closing entry stays out of that view.
    let net = ws
        .balances
        .net_income(ws.company_id, date(2025, 1, 1), date(2025, 12, 31))
        .await
        .unwrap();
    assert_eq!(net.net_income, dec("4200.00"));

    // The ledger as a whole still balances after the close.
    let trial = ws.balances.trial_balance(ws.company_id, None).await.unwrap();
    let debit_side: Decimal = trial
        .iter()
        .filter(|b| b.account.account_type.is_debit_normal())
        .map(|b| b.balance)
        .sum();
    let credit_side: Decimal = trial
        .iter()
        .filter(|b| !b.account.account_type.is_debit_normal())
        .map(|b| b.balance)
        .sum();
    assert_eq!(debit_side, credit_side);

    // The locked year refuses further activity.
    let err = ws
        .ledger
        .post_entry(&ledger_engine::models::PostJournalEntry {
            company_id: ws.company_id,
            reference: "LATE".to_string(),
            transaction_date: date(2025, 12, 30),
            description: "late entry".to_string(),
            created_by: "workflow-tests".to_string(),
            lines: vec![
                ledger_engine::models::LineInput {
                    account_id: accounts.cash.account_id,
                    description: None,
                    amount: dec("1.00"),
                    direction: ledger_engine::models::Direction::Debit,
                },
                ledger_engine::models::LineInput {
                    account_id: accounts.revenue.account_id,
                    description: None,
                    amount: dec("1.00"),
                    direction: ledger_engine::models::Direction::Credit,
                },
            ],
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ledger_engine::error::LedgerError::PeriodLocked { .. }
    ));

    // The next year starts clean.
    post_entry(
        &ws,
        "SALE-NEXT",
        accounts.cash.account_id,
        accounts.revenue.account_id,
        "500.00",
        date(2026, 1, 10),
    )
    .await;
    let next_year_net = ws
        .balances
        .net_income(ws.company_id, date(2026, 1, 1), date(2026, 12, 31))
        .await
        .unwrap();
    assert_eq!(next_year_net.net_income, dec("500.00"));
}
