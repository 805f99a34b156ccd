//! Allocation join row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One application of a source against a document. Created, never
/// mutated; reversal deletes the row and decrements both sides in the
/// same transaction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: Uuid,
    pub company_id: Uuid,
    pub source_id: Uuid,
    pub document_id: Uuid,
    pub amount: Decimal,
    pub created_by: String,
    pub allocated_utc: DateTime<Utc>,
}

/// One target of an allocation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub document_id: Uuid,
    pub amount: Decimal,
}
