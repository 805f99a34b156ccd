//! Allocation persistence seam.
//!
//! The allocator owns validation and status arithmetic; the store owns
//! atomicity and the optimistic version checks that serialize concurrent
//! allocation against the same source or document.

mod memory;
mod postgres;

pub use memory::MemAllocationStore;
pub use postgres::PgAllocationStore;

use accounting_core::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AllocatableDocument, Allocation, AllocationSource, DocumentFilter, SourceKind,
};

#[async_trait]
pub trait AllocationStore: Send + Sync {
    // Documents

    /// Insert a new document. Duplicate (company, kind, number) is a
    /// StateConflict.
    async fn insert_document(
        &self,
        document: AllocatableDocument,
    ) -> Result<AllocatableDocument, AppError>;

    async fn get_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<AllocatableDocument>, AppError>;

    async fn list_documents(
        &self,
        company_id: Uuid,
        filter: &DocumentFilter,
    ) -> Result<Vec<AllocatableDocument>, AppError>;

    /// Replace a document if its stored version still matches
    /// `expected_version`. A stale version is a ConcurrentModification;
    /// a missing row returns None.
    async fn update_document(
        &self,
        document: AllocatableDocument,
        expected_version: i64,
    ) -> Result<Option<AllocatableDocument>, AppError>;

    // Sources

    async fn insert_source(&self, source: AllocationSource)
        -> Result<AllocationSource, AppError>;

    async fn get_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Option<AllocationSource>, AppError>;

    async fn list_sources(
        &self,
        company_id: Uuid,
        kind: Option<SourceKind>,
        limit: i32,
    ) -> Result<Vec<AllocationSource>, AppError>;

    /// Replace a source if its stored version still matches
    /// `expected_version`, with the same semantics as `update_document`.
    async fn update_source(
        &self,
        source: AllocationSource,
        expected_version: i64,
    ) -> Result<Option<AllocationSource>, AppError>;

    // Allocations

    /// Commit an allocation batch: the allocation rows, the updated source,
    /// and every updated document, atomically. Any stale version fails the
    /// whole batch with ConcurrentModification and no effects.
    async fn apply_allocations(
        &self,
        source: AllocationSource,
        expected_source_version: i64,
        documents: Vec<(AllocatableDocument, i64)>,
        allocations: Vec<Allocation>,
    ) -> Result<Vec<Allocation>, AppError>;

    /// Reverse one allocation: delete the row and write both decremented
    /// sides, atomically, with the same version discipline.
    async fn remove_allocation(
        &self,
        allocation_id: Uuid,
        source: AllocationSource,
        expected_source_version: i64,
        document: AllocatableDocument,
        expected_document_version: i64,
    ) -> Result<(), AppError>;

    async fn get_allocation(
        &self,
        company_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<Option<Allocation>, AppError>;

    async fn allocations_for_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError>;

    async fn allocations_for_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError>;
}
