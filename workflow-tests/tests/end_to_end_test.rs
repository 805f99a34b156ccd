//! Full-cycle scenario: invoice, collect, reconcile, close.

use allocation_engine::models::{CreateDocument, CreateSource, DocumentKind, DocumentStatus, SourceKind};
use ledger_engine::services::CloseOptions;
use ledger_engine::store::BalanceScope;
use reconciliation_engine::models::StartReconciliation;
use rust_decimal::Decimal;
use workflow_tests::{
    chart_of_accounts, create_calendar_period, date, dec, ledger_candidates, post_entry,
    Workspace,
};

#[tokio::test]
async fn invoice_to_close_cycle() {
    let ws = Workspace::new();
    let accounts = chart_of_accounts(&ws).await;
    create_calendar_period(&ws, 2026).await;

    // 1. Invoice a customer and recognize the revenue.
    let invoice = ws
        .allocator
        .create_document(&CreateDocument {
            company_id: ws.company_id,
            kind: DocumentKind::Invoice,
            number: "INV-1001".to_string(),
            counterparty_name: "Acme Ltd".to_string(),
            document_date: date(2026, 4, 1),
            due_date: Some(date(2026, 5, 1)),
            total_amount: dec("1200.00"),
            metadata: None,
        })
        .await
        .unwrap();
    let invoice = ws
        .allocator
        .open_document(ws.company_id, invoice.document_id)
        .await
        .unwrap();
    post_entry(
        &ws,
        "INV-1001",
        accounts.receivables.account_id,
        accounts.revenue.account_id,
        "1200.00",
        date(2026, 4, 1),
    )
    .await;

    // 2. The customer pays; the payment settles the invoice and moves
    //    cash.
    let payment = ws
        .allocator
        .create_source(&CreateSource {
            company_id: ws.company_id,
            kind: SourceKind::Payment,
            reference: Some("PAY-551".to_string()),
            received_date: date(2026, 4, 18),
            amount: dec("1200.00"),
            metadata: None,
        })
        .await
        .unwrap();
    ws.allocator
        .allocate(
            ws.company_id,
            payment.source_id,
            invoice.document_id,
            dec("1200.00"),
            "workflow-tests",
        )
        .await
        .unwrap();
    post_entry(
        &ws,
        "PAY-551",
        accounts.cash.account_id,
        accounts.receivables.account_id,
        "1200.00",
        date(2026, 4, 18),
    )
    .await;

    let invoice = ws
        .allocator
        .get_document(ws.company_id, invoice.document_id)
        .await
        .unwrap();
    assert_eq!(invoice.status, DocumentStatus::Paid);

    // 3. Rent goes out of the bank.
    post_entry(
        &ws,
        "RENT-04",
        accounts.rent.account_id,
        accounts.cash.account_id,
        "400.00",
        date(2026, 4, 30),
    )
    .await;

    // 4. Reconcile the bank statement for April.
    let reconciliation = ws
        .reconciler
        .start(&StartReconciliation {
            company_id: ws.company_id,
            bank_account_id: accounts.cash.account_id,
            statement_date: date(2026, 4, 30),
            statement_ending_balance: dec("800.00"),
            beginning_balance: Decimal::ZERO,
            candidates: ledger_candidates(&ws, accounts.cash.account_id).await,
        })
        .await
        .unwrap();
    for item in ws
        .reconciler
        .items(ws.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap()
    {
        ws.reconciler
            .set_item_cleared(ws.company_id, item.item_id, true)
            .await
            .unwrap();
    }
    ws.reconciler
        .complete(ws.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();

    // 5. Close the year into retained earnings and lock it.
    let close = ws
        .closing
        .close(
            ws.company_id,
            2026,
            &CloseOptions {
                retained_earnings_account_id: accounts.retained_earnings.account_id,
                lock_period: true,
                created_by: "workflow-tests".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(close.total_revenue, dec("1200.00"));
    assert_eq!(close.total_expenses, dec("400.00"));
    assert_eq!(close.net_income, dec("800.00"));

    // Cash equals retained earnings equals what the bank statement said.
    let cash = ws
        .balances
        .balance_as_of(
            ws.company_id,
            accounts.cash.account_id,
            None,
            BalanceScope::Cumulative,
        )
        .await
        .unwrap();
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
    assert_eq!(cash, dec("800.00"));
    assert_eq!(retained, dec("800.00"));
}
