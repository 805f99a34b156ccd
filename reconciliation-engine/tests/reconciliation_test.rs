//! Reconciliation engine tests.

mod common;

use common::{candidate, dec, spawn_reconciler, start_reconciliation};
use reconciliation_engine::error::ReconciliationError;
use reconciliation_engine::models::ReconciliationStatus;
use rust_decimal::Decimal;
use uuid::Uuid;

/// The worked statement example: beginning 1,000.00, cleared deposits
/// 250.00, cleared payments 100.00 -> cleared balance 1,150.00.
#[tokio::test]
async fn summary_follows_cleared_balance_equation() {
    let t = spawn_reconciler();
    let reconciliation = start_reconciliation(
        &t,
        "1000.00",
        "1150.00",
        vec![
            candidate("250.00", 5),
            candidate("-100.00", 10),
            candidate("75.00", 15), // stays uncleared
        ],
    )
    .await;

    let items = t
        .reconciler
        .items(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(items.len(), 3);

    // Clear the deposit and the payment, leave the third item alone.
    for item in items.iter().filter(|i| i.amount.abs() != dec("75.00")) {
        t.reconciler
            .set_item_cleared(t.company_id, item.item_id, true)
            .await
            .unwrap();
    }

    let summary = t
        .reconciler
        .summary(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(summary.cleared_deposits, dec("250.00"));
    assert_eq!(summary.cleared_payments, dec("100.00"));
    assert_eq!(summary.cleared_balance, dec("1150.00"));
    assert_eq!(summary.difference, Decimal::ZERO);
    assert!(summary.balanced);
    assert_eq!(summary.cleared_count, 2);
    assert_eq!(summary.uncleared_count, 1);
}

#[tokio::test]
async fn completion_gate() {
    let t = spawn_reconciler();

    // Ending balance off by 10.00: completion must be rejected with the
    // difference surfaced.
    let reconciliation = start_reconciliation(
        &t,
        "1000.00",
        "1140.00",
        vec![candidate("250.00", 5), candidate("-100.00", 10)],
    )
    .await;
    let items = t
        .reconciler
        .items(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    for item in &items {
        t.reconciler
            .set_item_cleared(t.company_id, item.item_id, true)
            .await
            .unwrap();
    }

    let err = t
        .reconciler
        .complete(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap_err();
    match err {
        ReconciliationError::NotBalanced { difference } => {
            assert_eq!(difference, dec("-10.00"));
        }
        other => panic!("expected NotBalanced, got {other:?}"),
    }

    // No status change happened.
    let reconciliation = t
        .reconciler
        .get(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(reconciliation.status, ReconciliationStatus::InProgress);
    assert!(reconciliation.completed_utc.is_none());
}

#[tokio::test]
async fn complete_balanced_statement() {
    let t = spawn_reconciler();
    let reconciliation = start_reconciliation(
        &t,
        "1000.00",
        "1150.00",
        vec![candidate("250.00", 5), candidate("-100.00", 10)],
    )
    .await;
    let items = t
        .reconciler
        .items(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    for item in &items {
        t.reconciler
            .set_item_cleared(t.company_id, item.item_id, true)
            .await
            .unwrap();
    }

    let completed = t
        .reconciler
        .complete(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(completed.status, ReconciliationStatus::Completed);
    assert!(completed.completed_utc.is_some());

    // Completing again is a conflict.
    let err = t
        .reconciler
        .complete(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconciliationError::AlreadyCompleted(_)));

    // And so is touching any item afterwards.
    let err = t
        .reconciler
        .set_item_cleared(t.company_id, items[0].item_id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconciliationError::AlreadyCompleted(_)));
}

#[tokio::test]
async fn toggle_is_idempotent() {
    let t = spawn_reconciler();
    let reconciliation =
        start_reconciliation(&t, "0.00", "50.00", vec![candidate("50.00", 5)]).await;
    let items = t
        .reconciler
        .items(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    let item_id = items[0].item_id;

    let first = t
        .reconciler
        .set_item_cleared(t.company_id, item_id, true)
        .await
        .unwrap();
    let cleared_utc = first.cleared_utc;
    assert!(cleared_utc.is_some());

    // Clearing again changes nothing, including the timestamp.
    let second = t
        .reconciler
        .set_item_cleared(t.company_id, item_id, true)
        .await
        .unwrap();
    assert!(second.is_cleared);
    assert_eq!(second.cleared_utc, cleared_utc);

    // Unclearing resets the timestamp.
    let third = t
        .reconciler
        .set_item_cleared(t.company_id, item_id, false)
        .await
        .unwrap();
    assert!(!third.is_cleared);
    assert!(third.cleared_utc.is_none());

    let summary = t
        .reconciler
        .summary(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(summary.cleared_deposits, Decimal::ZERO);
}

#[tokio::test]
async fn empty_statement_balances_trivially() {
    let t = spawn_reconciler();
    let reconciliation = start_reconciliation(&t, "500.00", "500.00", vec![]).await;

    let summary = t
        .reconciler
        .summary(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert!(summary.balanced);

    let completed = t
        .reconciler
        .complete(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert_eq!(completed.status, ReconciliationStatus::Completed);
}

#[tokio::test]
async fn difference_within_tolerance_balances() {
    let t = spawn_reconciler();
    // Ending balance off by half a cent: still balanced under the one-cent
    // tolerance.
    let reconciliation =
        start_reconciliation(&t, "100.00", "150.005", vec![candidate("50.00", 5)]).await;
    let items = t
        .reconciler
        .items(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    t.reconciler
        .set_item_cleared(t.company_id, items[0].item_id, true)
        .await
        .unwrap();

    let summary = t
        .reconciler
        .summary(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert!(summary.balanced);
    t.reconciler
        .complete(t.company_id, reconciliation.reconciliation_id)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let t = spawn_reconciler();
    let err = t
        .reconciler
        .get(t.company_id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconciliationError::ReconciliationNotFound(_)
    ));

    let err = t
        .reconciler
        .set_item_cleared(t.company_id, Uuid::new_v4(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconciliationError::ItemNotFound(_)));
}

#[tokio::test]
async fn reconciliations_are_company_scoped() {
    let t = spawn_reconciler();
    let reconciliation =
        start_reconciliation(&t, "0.00", "0.00", vec![candidate("25.00", 2)]).await;

    let other_company = Uuid::new_v4();
    let err = t
        .reconciler
        .get(other_company, reconciliation.reconciliation_id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconciliationError::ReconciliationNotFound(_)
    ));

    let items = t
        .reconciler
        .items(other_company, reconciliation.reconciliation_id)
        .await
        .unwrap();
    assert!(items.is_empty());

    assert_eq!(
        t.reconciler
            .list(t.company_id, t.bank_account_id, 10)
            .await
            .unwrap()
            .len(),
        1
    );
}
