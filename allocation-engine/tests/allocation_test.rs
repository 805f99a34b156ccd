//! Allocation engine tests.

mod common;

use allocation_engine::error::AllocationError;
use allocation_engine::models::{AllocationRequest, DocumentStatus, SourceStatus};
use common::{create_deposit, create_open_invoice, dec, spawn_allocator};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn allocate_partial_payment() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "500.00").await;
    let payment = create_deposit(&t, "200.00").await;

    let allocation = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice.document_id,
            dec("200.00"),
            "tests",
        )
        .await
        .unwrap();
    assert_eq!(allocation.amount, dec("200.00"));

    let invoice = t
        .allocator
        .get_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    assert_eq!(invoice.amount_paid, dec("200.00"));
    assert_eq!(invoice.balance_due(), dec("300.00"));
    assert_eq!(invoice.status, DocumentStatus::Partial);

    let payment = t
        .allocator
        .get_source(t.company_id, payment.source_id)
        .await
        .unwrap();
    assert_eq!(payment.amount_applied, dec("200.00"));
    assert_eq!(payment.balance_remaining(), Decimal::ZERO);
    assert_eq!(payment.status, SourceStatus::Applied);
}

/// The worked deposit example: 500.00 spread over two invoices in one
/// action settles invoice A, leaves invoice B partial, and exhausts the
/// deposit.
#[tokio::test]
async fn allocate_deposit_across_invoices() {
    let t = spawn_allocator();
    let invoice_a = create_open_invoice(&t, "INV-A", "300.00").await;
    let invoice_b = create_open_invoice(&t, "INV-B", "500.00").await;
    let deposit = create_deposit(&t, "500.00").await;

    let allocations = t
        .allocator
        .allocate_batch(
            t.company_id,
            deposit.source_id,
            &[
                AllocationRequest {
                    document_id: invoice_a.document_id,
                    amount: dec("300.00"),
                },
                AllocationRequest {
                    document_id: invoice_b.document_id,
                    amount: dec("200.00"),
                },
            ],
            "tests",
        )
        .await
        .unwrap();
    assert_eq!(allocations.len(), 2);

    let invoice_a = t
        .allocator
        .get_document(t.company_id, invoice_a.document_id)
        .await
        .unwrap();
    assert_eq!(invoice_a.balance_due(), Decimal::ZERO);
    assert_eq!(invoice_a.status, DocumentStatus::Paid);

    let invoice_b = t
        .allocator
        .get_document(t.company_id, invoice_b.document_id)
        .await
        .unwrap();
    assert_eq!(invoice_b.balance_due(), dec("300.00"));
    assert_eq!(invoice_b.status, DocumentStatus::Partial);

    let deposit = t
        .allocator
        .get_source(t.company_id, deposit.source_id)
        .await
        .unwrap();
    assert_eq!(deposit.balance_remaining(), Decimal::ZERO);
    assert_eq!(deposit.status, SourceStatus::Applied);
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let t = spawn_allocator();
    let invoice_a = create_open_invoice(&t, "INV-A", "300.00").await;
    let invoice_b = create_open_invoice(&t, "INV-B", "100.00").await;
    let deposit = create_deposit(&t, "500.00").await;

    // Second target overpays, so the whole batch must fail.
    let err = t
        .allocator
        .allocate_batch(
            t.company_id,
            deposit.source_id,
            &[
                AllocationRequest {
                    document_id: invoice_a.document_id,
                    amount: dec("300.00"),
                },
                AllocationRequest {
                    document_id: invoice_b.document_id,
                    amount: dec("150.00"),
                },
            ],
            "tests",
        )
        .await
        .unwrap_err();
    match err {
        AllocationError::TargetOverpaid {
            requested,
            balance_due,
            ..
        } => {
            assert_eq!(requested, dec("150.00"));
            assert_eq!(balance_due, dec("100.00"));
        }
        other => panic!("expected TargetOverpaid, got {other:?}"),
    }

    // Nothing moved on either side.
    let invoice_a = t
        .allocator
        .get_document(t.company_id, invoice_a.document_id)
        .await
        .unwrap();
    assert_eq!(invoice_a.amount_paid, Decimal::ZERO);
    assert_eq!(invoice_a.status, DocumentStatus::Open);
    let deposit = t
        .allocator
        .get_source(t.company_id, deposit.source_id)
        .await
        .unwrap();
    assert_eq!(deposit.amount_applied, Decimal::ZERO);
    assert_eq!(deposit.status, SourceStatus::Open);
    assert!(t
        .allocator
        .allocations_for_source(t.company_id, deposit.source_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn source_exhausted_checks_batch_total() {
    let t = spawn_allocator();
    let invoice_a = create_open_invoice(&t, "INV-A", "300.00").await;
    let invoice_b = create_open_invoice(&t, "INV-B", "300.00").await;
    let deposit = create_deposit(&t, "500.00").await;

    // Each target individually fits the source, but not together.
    let err = t
        .allocator
        .allocate_batch(
            t.company_id,
            deposit.source_id,
            &[
                AllocationRequest {
                    document_id: invoice_a.document_id,
                    amount: dec("300.00"),
                },
                AllocationRequest {
                    document_id: invoice_b.document_id,
                    amount: dec("300.00"),
                },
            ],
            "tests",
        )
        .await
        .unwrap_err();
    match err {
        AllocationError::SourceExhausted {
            requested,
            remaining,
            ..
        } => {
            assert_eq!(requested, dec("600.00"));
            assert_eq!(remaining, dec("500.00"));
        }
        other => panic!("expected SourceExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn zero_and_negative_amounts_rejected() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "100.00").await;
    let payment = create_deposit(&t, "100.00").await;

    for amount in ["0.00", "-5.00"] {
        let err = t
            .allocator
            .allocate(
                t.company_id,
                payment.source_id,
                invoice.document_id,
                dec(amount),
                "tests",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AllocationError::ZeroOrNegativeAmount(_)));
    }
}

#[tokio::test]
async fn draft_and_voided_documents_not_allocatable() {
    let t = spawn_allocator();
    let payment = create_deposit(&t, "100.00").await;

    // A draft document (never opened).
    let draft = t
        .allocator
        .create_document(&allocation_engine::models::CreateDocument {
            company_id: t.company_id,
            kind: allocation_engine::models::DocumentKind::Invoice,
            number: "INV-D".to_string(),
            counterparty_name: "Acme Ltd".to_string(),
            document_date: common::date(2026, 1, 15),
            due_date: None,
            total_amount: dec("100.00"),
            metadata: None,
        })
        .await
        .unwrap();

    let err = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            draft.document_id,
            dec("50.00"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::DocumentNotAllocatable { .. }
    ));

    // A voided document.
    let voided = create_open_invoice(&t, "INV-V", "100.00").await;
    t.allocator
        .void_document(t.company_id, voided.document_id)
        .await
        .unwrap();
    let err = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            voided.document_id,
            dec("50.00"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::DocumentNotAllocatable { .. }
    ));
}

#[tokio::test]
async fn exhausted_source_cannot_fund_more() {
    let t = spawn_allocator();
    let invoice_a = create_open_invoice(&t, "INV-A", "100.00").await;
    let invoice_b = create_open_invoice(&t, "INV-B", "100.00").await;
    let payment = create_deposit(&t, "100.00").await;

    t.allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice_a.document_id,
            dec("100.00"),
            "tests",
        )
        .await
        .unwrap();

    let err = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice_b.document_id,
            dec("10.00"),
            "tests",
        )
        .await
        .unwrap_err();
    // The source is fully applied; its status blocks further funding.
    assert!(matches!(err, AllocationError::SourceNotAllocatable { .. }));
}

#[tokio::test]
async fn allocation_conservation() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "400.00").await;
    let payment_a = create_deposit(&t, "150.00").await;
    let payment_b = create_deposit(&t, "100.00").await;

    t.allocator
        .allocate(
            t.company_id,
            payment_a.source_id,
            invoice.document_id,
            dec("150.00"),
            "tests",
        )
        .await
        .unwrap();
    t.allocator
        .allocate(
            t.company_id,
            payment_b.source_id,
            invoice.document_id,
            dec("100.00"),
            "tests",
        )
        .await
        .unwrap();

    // amount_paid equals the sum of live allocation rows.
    let invoice = t
        .allocator
        .get_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    let allocations = t
        .allocator
        .allocations_for_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    let total: Decimal = allocations.iter().map(|a| a.amount).sum();
    assert_eq!(invoice.amount_paid, total);
    assert_eq!(invoice.amount_paid, dec("250.00"));

    let payment_a = t
        .allocator
        .get_source(t.company_id, payment_a.source_id)
        .await
        .unwrap();
    let source_allocations = t
        .allocator
        .allocations_for_source(t.company_id, payment_a.source_id)
        .await
        .unwrap();
    let applied: Decimal = source_allocations.iter().map(|a| a.amount).sum();
    assert_eq!(payment_a.amount_applied, applied);
}

#[tokio::test]
async fn unapply_restores_both_sides() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "300.00").await;
    let payment = create_deposit(&t, "300.00").await;

    let allocation = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice.document_id,
            dec("300.00"),
            "tests",
        )
        .await
        .unwrap();

    let invoice_paid = t
        .allocator
        .get_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    assert_eq!(invoice_paid.status, DocumentStatus::Paid);

    t.allocator
        .unapply(t.company_id, allocation.allocation_id)
        .await
        .unwrap();

    let invoice = t
        .allocator
        .get_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    assert_eq!(invoice.amount_paid, Decimal::ZERO);
    assert_eq!(invoice.status, DocumentStatus::Open);

    let payment = t
        .allocator
        .get_source(t.company_id, payment.source_id)
        .await
        .unwrap();
    assert_eq!(payment.amount_applied, Decimal::ZERO);
    assert_eq!(payment.status, SourceStatus::Open);

    assert!(t
        .allocator
        .allocations_for_document(t.company_id, invoice.document_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn balance_due_never_negative() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "100.00").await;
    let payment = create_deposit(&t, "500.00").await;

    t.allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice.document_id,
            dec("100.00"),
            "tests",
        )
        .await
        .unwrap();

    // Any further cent is an overpayment.
    let err = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice.document_id,
            dec("0.01"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AllocationError::DocumentNotAllocatable { .. } | AllocationError::TargetOverpaid { .. }
    ));

    let invoice = t
        .allocator
        .get_document(t.company_id, invoice.document_id)
        .await
        .unwrap();
    assert!(invoice.balance_due() >= Decimal::ZERO);
}

#[tokio::test]
async fn void_document_with_payments_rejected() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "200.00").await;
    let payment = create_deposit(&t, "50.00").await;

    t.allocator
        .allocate(
            t.company_id,
            payment.source_id,
            invoice.document_id,
            dec("50.00"),
            "tests",
        )
        .await
        .unwrap();

    let err = t
        .allocator
        .void_document(t.company_id, invoice.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::DocumentHasPayments { .. }));
}

#[tokio::test]
async fn refund_only_while_unapplied() {
    let t = spawn_allocator();
    let invoice = create_open_invoice(&t, "INV-001", "200.00").await;
    let deposit = create_deposit(&t, "200.00").await;

    t.allocator
        .allocate(
            t.company_id,
            deposit.source_id,
            invoice.document_id,
            dec("50.00"),
            "tests",
        )
        .await
        .unwrap();

    // Refund refused while anything is applied.
    let err = t
        .allocator
        .refund_source(t.company_id, deposit.source_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::SourceHasAllocations { .. }));

    // Unapply, then the refund goes through and the source stops funding.
    let allocations = t
        .allocator
        .allocations_for_source(t.company_id, deposit.source_id)
        .await
        .unwrap();
    t.allocator
        .unapply(t.company_id, allocations[0].allocation_id)
        .await
        .unwrap();
    let refunded = t
        .allocator
        .refund_source(t.company_id, deposit.source_id)
        .await
        .unwrap();
    assert_eq!(refunded.status, SourceStatus::Refunded);

    let err = t
        .allocator
        .allocate(
            t.company_id,
            deposit.source_id,
            invoice.document_id,
            dec("10.00"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::SourceNotAllocatable { .. }));
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let t = spawn_allocator();
    let payment = create_deposit(&t, "50.00").await;

    let err = t
        .allocator
        .allocate(
            t.company_id,
            payment.source_id,
            Uuid::new_v4(),
            dec("10.00"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::DocumentNotFound(_)));

    let err = t
        .allocator
        .allocate(
            t.company_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            dec("10.00"),
            "tests",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AllocationError::SourceNotFound(_)));
}
