//! In-process allocation store.

use std::collections::HashMap;
use std::sync::Mutex;

use accounting_core::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AllocatableDocument, Allocation, AllocationSource, DocumentFilter, SourceKind,
};
use crate::store::AllocationStore;

#[derive(Default)]
struct MemState {
    documents: HashMap<Uuid, AllocatableDocument>,
    sources: HashMap<Uuid, AllocationSource>,
    allocations: HashMap<Uuid, Allocation>,
}

/// Memory-backed [`AllocationStore`].
#[derive(Default)]
pub struct MemAllocationStore {
    state: Mutex<MemState>,
}

impl MemAllocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn stale(entity: &str, id: Uuid) -> AppError {
    AppError::ConcurrentModification(anyhow::anyhow!(
        "{entity} {id} was modified concurrently; refresh and retry"
    ))
}

#[async_trait]
impl AllocationStore for MemAllocationStore {
    async fn insert_document(
        &self,
        document: AllocatableDocument,
    ) -> Result<AllocatableDocument, AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");
        let duplicate = state.documents.values().any(|d| {
            d.company_id == document.company_id
                && d.kind == document.kind
                && d.number == document.number
        });
        if duplicate {
            return Err(AppError::StateConflict(anyhow::anyhow!(
                "{} with number '{}' already exists for company",
                document.kind,
                document.number
            )));
        }
        state.documents.insert(document.document_id, document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<AllocatableDocument>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        Ok(state
            .documents
            .get(&document_id)
            .filter(|d| d.company_id == company_id)
            .cloned())
    }

    async fn list_documents(
        &self,
        company_id: Uuid,
        filter: &DocumentFilter,
    ) -> Result<Vec<AllocatableDocument>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        let limit = filter.limit.clamp(1, 100) as usize;
        let mut documents: Vec<AllocatableDocument> = state
            .documents
            .values()
            .filter(|d| d.company_id == company_id)
            .filter(|d| filter.kind.is_none_or(|k| d.kind == k))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        documents.sort_by(|a, b| {
            b.document_date
                .cmp(&a.document_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        documents.truncate(limit);
        Ok(documents)
    }

    async fn update_document(
        &self,
        document: AllocatableDocument,
        expected_version: i64,
    ) -> Result<Option<AllocatableDocument>, AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");
        let Some(existing) = state
            .documents
            .get_mut(&document.document_id)
            .filter(|d| d.company_id == document.company_id)
        else {
            return Ok(None);
        };
        if existing.version != expected_version {
            return Err(stale("document", document.document_id));
        }
        *existing = document.clone();
        Ok(Some(document))
    }

    async fn insert_source(
        &self,
        source: AllocationSource,
    ) -> Result<AllocationSource, AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");
        state.sources.insert(source.source_id, source.clone());
        Ok(source)
    }

    async fn get_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Option<AllocationSource>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        Ok(state
            .sources
            .get(&source_id)
            .filter(|s| s.company_id == company_id)
            .cloned())
    }

    async fn list_sources(
        &self,
        company_id: Uuid,
        kind: Option<SourceKind>,
        limit: i32,
    ) -> Result<Vec<AllocationSource>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        let limit = limit.clamp(1, 100) as usize;
        let mut sources: Vec<AllocationSource> = state
            .sources
            .values()
            .filter(|s| s.company_id == company_id)
            .filter(|s| kind.is_none_or(|k| s.kind == k))
            .cloned()
            .collect();
        sources.sort_by(|a, b| {
            b.received_date
                .cmp(&a.received_date)
                .then(b.created_utc.cmp(&a.created_utc))
        });
        sources.truncate(limit);
        Ok(sources)
    }

    async fn update_source(
        &self,
        source: AllocationSource,
        expected_version: i64,
    ) -> Result<Option<AllocationSource>, AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");
        let Some(existing) = state
            .sources
            .get_mut(&source.source_id)
            .filter(|s| s.company_id == source.company_id)
        else {
            return Ok(None);
        };
        if existing.version != expected_version {
            return Err(stale("source", source.source_id));
        }
        *existing = source.clone();
        Ok(Some(source))
    }

    async fn apply_allocations(
        &self,
        source: AllocationSource,
        expected_source_version: i64,
        documents: Vec<(AllocatableDocument, i64)>,
        allocations: Vec<Allocation>,
    ) -> Result<Vec<Allocation>, AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");

        // Validate every version before touching anything; the single
        // critical section makes the whole batch atomic.
        let current_source = state
            .sources
            .get(&source.source_id)
            .ok_or_else(|| stale("source", source.source_id))?;
        if current_source.version != expected_source_version {
            return Err(stale("source", source.source_id));
        }
        for (document, expected_version) in &documents {
            let current = state
                .documents
                .get(&document.document_id)
                .ok_or_else(|| stale("document", document.document_id))?;
            if current.version != *expected_version {
                return Err(stale("document", document.document_id));
            }
        }

        state.sources.insert(source.source_id, source);
        for (document, _) in documents {
            state.documents.insert(document.document_id, document);
        }
        for allocation in &allocations {
            state
                .allocations
                .insert(allocation.allocation_id, allocation.clone());
        }
        Ok(allocations)
    }

    async fn remove_allocation(
        &self,
        allocation_id: Uuid,
        source: AllocationSource,
        expected_source_version: i64,
        document: AllocatableDocument,
        expected_document_version: i64,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().expect("allocation store poisoned");

        if !state.allocations.contains_key(&allocation_id) {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "allocation {allocation_id} not found"
            )));
        }
        let current_source = state
            .sources
            .get(&source.source_id)
            .ok_or_else(|| stale("source", source.source_id))?;
        if current_source.version != expected_source_version {
            return Err(stale("source", source.source_id));
        }
        let current_document = state
            .documents
            .get(&document.document_id)
            .ok_or_else(|| stale("document", document.document_id))?;
        if current_document.version != expected_document_version {
            return Err(stale("document", document.document_id));
        }

        state.allocations.remove(&allocation_id);
        state.sources.insert(source.source_id, source);
        state.documents.insert(document.document_id, document);
        Ok(())
    }

    async fn get_allocation(
        &self,
        company_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<Option<Allocation>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        Ok(state
            .allocations
            .get(&allocation_id)
            .filter(|a| a.company_id == company_id)
            .cloned())
    }

    async fn allocations_for_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        let mut allocations: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| a.company_id == company_id && a.source_id == source_id)
            .cloned()
            .collect();
        allocations.sort_by(|a, b| a.allocated_utc.cmp(&b.allocated_utc));
        Ok(allocations)
    }

    async fn allocations_for_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let state = self.state.lock().expect("allocation store poisoned");
        let mut allocations: Vec<Allocation> = state
            .allocations
            .values()
            .filter(|a| a.company_id == company_id && a.document_id == document_id)
            .cloned()
            .collect();
        allocations.sort_by(|a, b| a.allocated_utc.cmp(&b.allocated_utc));
        Ok(allocations)
    }
}
