//! Invoicing + payment allocation against the ledger.

use allocation_engine::models::{
    AllocationRequest, CreateDocument, CreateSource, DocumentKind, DocumentStatus, SourceKind,
    SourceStatus,
};
use ledger_engine::store::BalanceScope;
use rust_decimal::Decimal;
use workflow_tests::{chart_of_accounts, date, dec, post_entry, Workspace};

/// A customer deposit spread over two invoices, with the matching ledger
/// postings kept in step: receivables mirror the open document balances.
#[tokio::test]
async fn deposit_allocation_mirrors_receivables() {
    let ws = Workspace::new();
    let accounts = chart_of_accounts(&ws).await;

    // Issue two invoices and post their revenue recognition entries.
    let mut invoices = Vec::new();
    for (number, total, day) in [("INV-A", "300.00", 3), ("INV-B", "500.00", 5)] {
        let document = ws
            .allocator
            .create_document(&CreateDocument {
                company_id: ws.company_id,
                kind: DocumentKind::Invoice,
                number: number.to_string(),
                counterparty_name: "Acme Ltd".to_string(),
                document_date: date(2026, 1, day),
                due_date: Some(date(2026, 2, day)),
                total_amount: dec(total),
                metadata: None,
            })
            .await
            .unwrap();
        let document = ws
            .allocator
            .open_document(ws.company_id, document.document_id)
            .await
            .unwrap();
        post_entry(
            &ws,
            number,
            accounts.receivables.account_id,
            accounts.revenue.account_id,
            total,
            date(2026, 1, day),
        )
        .await;
        invoices.push(document);
    }

    // Receivables carry the full open amount.
    let receivables = ws
        .balances
        .balance_as_of(
            ws.company_id,
            accounts.receivables.account_id,
            None,
            BalanceScope::Cumulative,
        )
        .await
        .unwrap();
    assert_eq!(receivables, dec("800.00"));

    // A 500.00 deposit arrives and is spread in one action.
    let deposit = ws
        .allocator
        .create_source(&CreateSource {
            company_id: ws.company_id,
            kind: SourceKind::Deposit,
            reference: Some("DEP-100".to_string()),
            received_date: date(2026, 1, 20),
            amount: dec("500.00"),
            metadata: None,
        })
        .await
        .unwrap();

    ws.allocator
        .allocate_batch(
            ws.company_id,
            deposit.source_id,
            &[
                AllocationRequest {
                    document_id: invoices[0].document_id,
                    amount: dec("300.00"),
                },
                AllocationRequest {
                    document_id: invoices[1].document_id,
                    amount: dec("200.00"),
                },
            ],
            "workflow-tests",
        )
        .await
        .unwrap();

    // The cash receipt settles receivables for the applied amount.
    post_entry(
        &ws,
        "DEP-100",
        accounts.cash.account_id,
        accounts.receivables.account_id,
        "500.00",
        date(2026, 1, 20),
    )
    .await;

    // Document side: A paid, B partial, deposit exhausted.
    let invoice_a = ws
        .allocator
        .get_document(ws.company_id, invoices[0].document_id)
        .await
        .unwrap();
    assert_eq!(invoice_a.status, DocumentStatus::Paid);
    let invoice_b = ws
        .allocator
        .get_document(ws.company_id, invoices[1].document_id)
        .await
        .unwrap();
    assert_eq!(invoice_b.status, DocumentStatus::Partial);
    assert_eq!(invoice_b.balance_due(), dec("300.00"));
    let deposit = ws
        .allocator
        .get_source(ws.company_id, deposit.source_id)
        .await
        .unwrap();
    assert_eq!(deposit.status, SourceStatus::Applied);

    // Ledger side: receivables now equal the open document balance.
    let receivables = ws
        .balances
        .balance_as_of(
            ws.company_id,
            accounts.receivables.account_id,
            None,
            BalanceScope::Cumulative,
        )
        .await
        .unwrap();
    assert_eq!(receivables, invoice_b.balance_due());

    // And the books still balance overall.
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
}
