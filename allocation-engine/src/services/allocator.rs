//! Applying sources of funds against outstanding documents.
//!
//! A batch is all-or-nothing: every target is validated before anything
//! is written, and the store commits the rows plus both sides'
//! denormalized amounts in one version-checked transaction.

use std::collections::HashMap;
use std::sync::Arc;

use accounting_core::money::is_settled;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::AllocationError;
use crate::models::{
    AllocatableDocument, Allocation, AllocationRequest, AllocationSource, CreateDocument,
    CreateSource, DocumentFilter, DocumentStatus, SourceKind, SourceStatus,
};
use crate::services::metrics::{ALLOCATIONS_TOTAL, DOCUMENTS_CREATED, SOURCES_CREATED};
use crate::store::AllocationStore;

/// The allocation engine.
pub struct Allocator<S> {
    store: Arc<S>,
}

impl<S: AllocationStore> Allocator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    // -------------------------------------------------------------------------
    // Documents
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(company_id = %input.company_id, number = %input.number))]
    pub async fn create_document(
        &self,
        input: &CreateDocument,
    ) -> Result<AllocatableDocument, AllocationError> {
        input.validate()?;
        if input.total_amount <= Decimal::ZERO {
            return Err(AllocationError::NonPositiveDocumentAmount(
                input.total_amount,
            ));
        }

        let now = Utc::now();
        let document = AllocatableDocument {
            document_id: Uuid::new_v4(),
            company_id: input.company_id,
            kind: input.kind,
            number: input.number.clone(),
            counterparty_name: input.counterparty_name.clone(),
            document_date: input.document_date,
            due_date: input.due_date,
            total_amount: input.total_amount,
            amount_paid: Decimal::ZERO,
            status: DocumentStatus::Draft,
            version: 0,
            metadata: input.metadata.clone(),
            created_utc: now,
            updated_utc: now,
        };

        let document = self.store.insert_document(document).await?;
        DOCUMENTS_CREATED
            .with_label_values(&[document.kind.as_str()])
            .inc();
        Ok(document)
    }

    pub async fn get_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<AllocatableDocument, AllocationError> {
        self.store
            .get_document(company_id, document_id)
            .await?
            .ok_or(AllocationError::DocumentNotFound(document_id))
    }

    pub async fn list_documents(
        &self,
        company_id: Uuid,
        filter: &DocumentFilter,
    ) -> Result<Vec<AllocatableDocument>, AllocationError> {
        Ok(self.store.list_documents(company_id, filter).await?)
    }

    /// Open a draft document for allocation.
    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    pub async fn open_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<AllocatableDocument, AllocationError> {
        let document = self.get_document(company_id, document_id).await?;
        if document.status != DocumentStatus::Draft {
            return Err(AllocationError::InvalidDocumentStatus {
                document_id,
                status: document.status.to_string(),
                expected: DocumentStatus::Draft.to_string(),
            });
        }
        let expected_version = document.version;
        let mut updated = document;
        updated.status = DocumentStatus::Open;
        updated.version += 1;
        self.store
            .update_document(updated, expected_version)
            .await?
            .ok_or(AllocationError::DocumentNotFound(document_id))
    }

    /// Void a document. Refused once anything has been applied against it;
    /// unapply the allocations first.
    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    pub async fn void_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<AllocatableDocument, AllocationError> {
        let document = self.get_document(company_id, document_id).await?;
        if !is_settled(document.amount_paid) {
            return Err(AllocationError::DocumentHasPayments {
                document_id,
                amount_paid: document.amount_paid,
            });
        }
        if !matches!(document.status, DocumentStatus::Draft | DocumentStatus::Open) {
            return Err(AllocationError::InvalidDocumentStatus {
                document_id,
                status: document.status.to_string(),
                expected: "draft or open".to_string(),
            });
        }
        let expected_version = document.version;
        let mut updated = document;
        updated.status = DocumentStatus::Voided;
        updated.version += 1;
        self.store
            .update_document(updated, expected_version)
            .await?
            .ok_or(AllocationError::DocumentNotFound(document_id))
    }

    // -------------------------------------------------------------------------
    // Sources
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(company_id = %input.company_id, kind = %input.kind))]
    pub async fn create_source(
        &self,
        input: &CreateSource,
    ) -> Result<AllocationSource, AllocationError> {
        input.validate()?;
        if input.amount <= Decimal::ZERO {
            return Err(AllocationError::ZeroOrNegativeAmount(input.amount));
        }

        let now = Utc::now();
        let source = AllocationSource {
            source_id: Uuid::new_v4(),
            company_id: input.company_id,
            kind: input.kind,
            reference: input.reference.clone(),
            received_date: input.received_date,
            amount: input.amount,
            amount_applied: Decimal::ZERO,
            status: SourceStatus::Open,
            version: 0,
            metadata: input.metadata.clone(),
            created_utc: now,
            updated_utc: now,
        };

        let source = self.store.insert_source(source).await?;
        SOURCES_CREATED
            .with_label_values(&[source.kind.as_str()])
            .inc();
        Ok(source)
    }

    pub async fn get_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<AllocationSource, AllocationError> {
        self.store
            .get_source(company_id, source_id)
            .await?
            .ok_or(AllocationError::SourceNotFound(source_id))
    }

    pub async fn list_sources(
        &self,
        company_id: Uuid,
        kind: Option<SourceKind>,
        limit: i32,
    ) -> Result<Vec<AllocationSource>, AllocationError> {
        Ok(self.store.list_sources(company_id, kind, limit).await?)
    }

    /// Refund an unapplied source back to the customer.
    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id))]
    pub async fn refund_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<AllocationSource, AllocationError> {
        self.retire_source(company_id, source_id, SourceStatus::Refunded)
            .await
    }

    /// Void a source recorded in error.
    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id))]
    pub async fn void_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<AllocationSource, AllocationError> {
        self.retire_source(company_id, source_id, SourceStatus::Voided)
            .await
    }

    /// Shared guard for refund/void: nothing may remain applied.
    async fn retire_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
        status: SourceStatus,
    ) -> Result<AllocationSource, AllocationError> {
        let source = self.get_source(company_id, source_id).await?;
        if !is_settled(source.amount_applied) {
            return Err(AllocationError::SourceHasAllocations {
                source_id,
                amount_applied: source.amount_applied,
            });
        }
        if !source.status.is_allocatable() {
            return Err(AllocationError::SourceNotAllocatable {
                source_id,
                status: source.status.to_string(),
            });
        }
        let expected_version = source.version;
        let mut updated = source;
        updated.status = status;
        updated.version += 1;
        updated.updated_utc = Utc::now();
        self.store
            .update_source(updated, expected_version)
            .await?
            .ok_or(AllocationError::SourceNotFound(source_id))
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    /// Apply part of a source against a single document.
    pub async fn allocate(
        &self,
        company_id: Uuid,
        source_id: Uuid,
        document_id: Uuid,
        amount: Decimal,
        created_by: &str,
    ) -> Result<Allocation, AllocationError> {
        let mut allocations = self
            .allocate_batch(
                company_id,
                source_id,
                &[AllocationRequest {
                    document_id,
                    amount,
                }],
                created_by,
            )
            .await?;
        Ok(allocations.remove(0))
    }

    /// Apply a source against several documents in one user action.
    /// All-or-nothing: any validation failure leaves every entity
    /// untouched.
    #[instrument(skip(self, requests), fields(company_id = %company_id, source_id = %source_id, target_count = requests.len()))]
    pub async fn allocate_batch(
        &self,
        company_id: Uuid,
        source_id: Uuid,
        requests: &[AllocationRequest],
        created_by: &str,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let result = self
            .allocate_batch_inner(company_id, source_id, requests, created_by)
            .await;
        let status = if result.is_ok() { "ok" } else { "error" };
        ALLOCATIONS_TOTAL.with_label_values(&[status]).inc();
        result
    }

    async fn allocate_batch_inner(
        &self,
        company_id: Uuid,
        source_id: Uuid,
        requests: &[AllocationRequest],
        created_by: &str,
    ) -> Result<Vec<Allocation>, AllocationError> {
        let mut total = Decimal::ZERO;
        for request in requests {
            if request.amount <= Decimal::ZERO {
                return Err(AllocationError::ZeroOrNegativeAmount(request.amount));
            }
            total += request.amount;
        }
        if requests.is_empty() {
            return Err(AllocationError::ZeroOrNegativeAmount(Decimal::ZERO));
        }

        let source = self.get_source(company_id, source_id).await?;
        if !source.status.is_allocatable() {
            return Err(AllocationError::SourceNotAllocatable {
                source_id,
                status: source.status.to_string(),
            });
        }
        let remaining = source.balance_remaining();
        if total > remaining {
            return Err(AllocationError::SourceExhausted {
                source_id,
                requested: total,
                remaining,
            });
        }

        // The same document may appear several times in one batch; validate
        // against its combined total.
        let mut per_document: Vec<(Uuid, Decimal)> = Vec::new();
        for request in requests {
            match per_document
                .iter_mut()
                .find(|(id, _)| *id == request.document_id)
            {
                Some((_, amount)) => *amount += request.amount,
                None => per_document.push((request.document_id, request.amount)),
            }
        }

        let mut documents: HashMap<Uuid, AllocatableDocument> = HashMap::new();
        for (document_id, requested) in &per_document {
            let document = self.get_document(company_id, *document_id).await?;
            if !document.status.is_allocatable() {
                return Err(AllocationError::DocumentNotAllocatable {
                    document_id: *document_id,
                    status: document.status.to_string(),
                });
            }
            let balance_due = document.balance_due();
            if *requested > balance_due {
                return Err(AllocationError::TargetOverpaid {
                    document_id: *document_id,
                    requested: *requested,
                    balance_due,
                });
            }
            documents.insert(*document_id, document);
        }

        // Every check passed; compute the committed state.
        let now = Utc::now();
        let expected_source_version = source.version;
        let mut updated_source = source;
        updated_source.amount_applied += total;
        updated_source.status = source_status(&updated_source);
        updated_source.version += 1;
        updated_source.updated_utc = now;

        let mut updated_documents = Vec::with_capacity(per_document.len());
        for (document_id, requested) in &per_document {
            let document = documents.remove(document_id).expect("validated above");
            let expected_version = document.version;
            let mut updated = document;
            updated.amount_paid += *requested;
            updated.status = document_status(&updated);
            updated.version += 1;
            updated.updated_utc = now;
            updated_documents.push((updated, expected_version));
        }

        let allocations: Vec<Allocation> = requests
            .iter()
            .map(|request| Allocation {
                allocation_id: Uuid::new_v4(),
                company_id,
                source_id,
                document_id: request.document_id,
                amount: request.amount,
                created_by: created_by.to_string(),
                allocated_utc: now,
            })
            .collect();

        let applied = self
            .store
            .apply_allocations(
                updated_source,
                expected_source_version,
                updated_documents,
                allocations,
            )
            .await?;

        info!(
            source_id = %source_id,
            total = %total,
            allocation_count = applied.len(),
            "Allocations applied"
        );

        Ok(applied)
    }

    /// Reverse a single allocation, restoring both sides.
    #[instrument(skip(self), fields(company_id = %company_id, allocation_id = %allocation_id))]
    pub async fn unapply(
        &self,
        company_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<(), AllocationError> {
        let allocation = self
            .store
            .get_allocation(company_id, allocation_id)
            .await?
            .ok_or(AllocationError::AllocationNotFound(allocation_id))?;

        let source = self.get_source(company_id, allocation.source_id).await?;
        let document = self
            .get_document(company_id, allocation.document_id)
            .await?;

        let now = Utc::now();
        let expected_source_version = source.version;
        let mut updated_source = source;
        updated_source.amount_applied -= allocation.amount;
        updated_source.status = source_status(&updated_source);
        updated_source.version += 1;
        updated_source.updated_utc = now;

        let expected_document_version = document.version;
        let mut updated_document = document;
        updated_document.amount_paid -= allocation.amount;
        updated_document.status = document_status(&updated_document);
        updated_document.version += 1;
        updated_document.updated_utc = now;

        self.store
            .remove_allocation(
                allocation_id,
                updated_source,
                expected_source_version,
                updated_document,
                expected_document_version,
            )
            .await?;

        info!(
            allocation_id = %allocation_id,
            amount = %allocation.amount,
            "Allocation reversed"
        );

        Ok(())
    }

    pub async fn allocations_for_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Vec<Allocation>, AllocationError> {
        Ok(self
            .store
            .allocations_for_source(company_id, source_id)
            .await?)
    }

    pub async fn allocations_for_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Allocation>, AllocationError> {
        Ok(self
            .store
            .allocations_for_document(company_id, document_id)
            .await?)
    }
}

/// Source status from its applied amount: Applied when nothing meaningful
/// remains (0.005 tolerance), PartiallyApplied while something is, Open
/// when untouched.
fn source_status(source: &AllocationSource) -> SourceStatus {
    if is_settled(source.balance_remaining()) {
        SourceStatus::Applied
    } else if is_settled(source.amount_applied) {
        SourceStatus::Open
    } else {
        SourceStatus::PartiallyApplied
    }
}

/// Document status from its paid amount, same tolerance.
fn document_status(document: &AllocatableDocument) -> DocumentStatus {
    if is_settled(document.balance_due()) {
        DocumentStatus::Paid
    } else if is_settled(document.amount_paid) {
        DocumentStatus::Open
    } else {
        DocumentStatus::Partial
    }
}
