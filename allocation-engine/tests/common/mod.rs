//! Shared helpers for allocation engine tests.

#![allow(dead_code)]

use std::sync::Arc;

use allocation_engine::models::{
    AllocatableDocument, AllocationSource, CreateDocument, CreateSource, DocumentKind,
    SourceKind,
};
use allocation_engine::services::Allocator;
use allocation_engine::store::MemAllocationStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct TestAllocator {
    pub allocator: Allocator<MemAllocationStore>,
    pub company_id: Uuid,
}

pub fn spawn_allocator() -> TestAllocator {
    TestAllocator {
        allocator: Allocator::new(Arc::new(MemAllocationStore::new())),
        company_id: Uuid::new_v4(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Create an invoice and open it for allocation.
pub async fn create_open_invoice(
    t: &TestAllocator,
    number: &str,
    total: &str,
) -> AllocatableDocument {
    let document = t
        .allocator
        .create_document(&CreateDocument {
            company_id: t.company_id,
            kind: DocumentKind::Invoice,
            number: number.to_string(),
            counterparty_name: "Acme Ltd".to_string(),
            document_date: date(2026, 1, 15),
            due_date: Some(date(2026, 2, 14)),
            total_amount: dec(total),
            metadata: None,
        })
        .await
        .expect("create document");
    t.allocator
        .open_document(t.company_id, document.document_id)
        .await
        .expect("open document")
}

pub async fn create_deposit(t: &TestAllocator, amount: &str) -> AllocationSource {
    t.allocator
        .create_source(&CreateSource {
            company_id: t.company_id,
            kind: SourceKind::Deposit,
            reference: None,
            received_date: date(2026, 1, 20),
            amount: dec(amount),
            metadata: None,
        })
        .await
        .expect("create source")
}
