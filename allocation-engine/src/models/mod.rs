//! Domain models for the allocation engine.

mod allocation;
mod document;
mod source;

pub use allocation::{Allocation, AllocationRequest};
pub use document::{
    AllocatableDocument, CreateDocument, DocumentFilter, DocumentKind, DocumentStatus,
};
pub use source::{AllocationSource, CreateSource, SourceKind, SourceStatus};
