//! PostgreSQL-backed allocation store.

use accounting_core::config::Config;
use accounting_core::error::AppError;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    AllocatableDocument, Allocation, AllocationSource, DocumentFilter, SourceKind,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::store::AllocationStore;

const DOCUMENT_COLUMNS: &str = "document_id, company_id, kind, number, counterparty_name, \
     document_date, due_date, total_amount, amount_paid, status, version, metadata, \
     created_utc, updated_utc";

const SOURCE_COLUMNS: &str = "source_id, company_id, kind, reference, received_date, amount, \
     amount_applied, status, version, metadata, created_utc, updated_utc";

const ALLOCATION_COLUMNS: &str =
    "allocation_id, company_id, source_id, document_id, amount, created_by, allocated_utc";

fn stale(entity: &str, id: Uuid) -> AppError {
    AppError::ConcurrentModification(anyhow::anyhow!(
        "{entity} {id} was modified concurrently; refresh and retry"
    ))
}

/// Database connection pool wrapper implementing [`AllocationStore`].
#[derive(Clone)]
pub struct PgAllocationStore {
    pool: PgPool,
}

impl PgAllocationStore {
    /// Create a new store from configuration.
    #[instrument(skip(config), fields(service = "allocation-engine"))]
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&config.database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl AllocationStore for PgAllocationStore {
    #[instrument(skip(self, document), fields(company_id = %document.company_id, number = %document.number))]
    async fn insert_document(
        &self,
        document: AllocatableDocument,
    ) -> Result<AllocatableDocument, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_document"])
            .start_timer();

        let inserted = sqlx::query_as::<_, AllocatableDocument>(&format!(
            r#"
            INSERT INTO allocatable_documents (document_id, company_id, kind, number, counterparty_name,
                document_date, due_date, total_amount, amount_paid, status, version, metadata,
                created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {DOCUMENT_COLUMNS}
            "#,
        ))
        .bind(document.document_id)
        .bind(document.company_id)
        .bind(document.kind)
        .bind(&document.number)
        .bind(&document.counterparty_name)
        .bind(document.document_date)
        .bind(document.due_date)
        .bind(document.total_amount)
        .bind(document.amount_paid)
        .bind(document.status)
        .bind(document.version)
        .bind(&document.metadata)
        .bind(document.created_utc)
        .bind(document.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::StateConflict(anyhow::anyhow!(
                    "{} with number '{}' already exists for company",
                    document.kind,
                    document.number
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create document: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            document_id = %inserted.document_id,
            kind = %inserted.kind,
            total_amount = %inserted.total_amount,
            "Document created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    async fn get_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<AllocatableDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_document"])
            .start_timer();

        let document = sqlx::query_as::<_, AllocatableDocument>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM allocatable_documents
            WHERE company_id = $1 AND document_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get document: {}", e)))?;

        timer.observe_duration();

        Ok(document)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_documents(
        &self,
        company_id: Uuid,
        filter: &DocumentFilter,
    ) -> Result<Vec<AllocatableDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_documents"])
            .start_timer();

        let limit = filter.limit.clamp(1, 100) as i64;

        let documents = sqlx::query_as::<_, AllocatableDocument>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM allocatable_documents
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::varchar IS NULL OR status = $3)
            ORDER BY document_date DESC, created_utc DESC
            LIMIT $4
            "#,
        ))
        .bind(company_id)
        .bind(filter.kind)
        .bind(filter.status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list documents: {}", e)))?;

        timer.observe_duration();

        Ok(documents)
    }

    #[instrument(skip(self, document), fields(document_id = %document.document_id))]
    async fn update_document(
        &self,
        document: AllocatableDocument,
        expected_version: i64,
    ) -> Result<Option<AllocatableDocument>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_document"])
            .start_timer();

        let updated = sqlx::query_as::<_, AllocatableDocument>(&format!(
            r#"
            UPDATE allocatable_documents
            SET amount_paid = $3, status = $4, version = $5, updated_utc = NOW()
            WHERE company_id = $1 AND document_id = $2 AND version = $6
            RETURNING {DOCUMENT_COLUMNS}
            "#,
        ))
        .bind(document.company_id)
        .bind(document.document_id)
        .bind(document.amount_paid)
        .bind(document.status)
        .bind(document.version)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update document: {}", e)))?;

        timer.observe_duration();

        match updated {
            Some(doc) => Ok(Some(doc)),
            None => {
                // Distinguish a missing row from a stale version.
                let exists = self
                    .get_document(document.company_id, document.document_id)
                    .await?;
                match exists {
                    Some(_) => Err(stale("document", document.document_id)),
                    None => Ok(None),
                }
            }
        }
    }

    #[instrument(skip(self, source), fields(company_id = %source.company_id, kind = %source.kind))]
    async fn insert_source(
        &self,
        source: AllocationSource,
    ) -> Result<AllocationSource, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_source"])
            .start_timer();

        let inserted = sqlx::query_as::<_, AllocationSource>(&format!(
            r#"
            INSERT INTO allocation_sources (source_id, company_id, kind, reference, received_date,
                amount, amount_applied, status, version, metadata, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {SOURCE_COLUMNS}
            "#,
        ))
        .bind(source.source_id)
        .bind(source.company_id)
        .bind(source.kind)
        .bind(&source.reference)
        .bind(source.received_date)
        .bind(source.amount)
        .bind(source.amount_applied)
        .bind(source.status)
        .bind(source.version)
        .bind(&source.metadata)
        .bind(source.created_utc)
        .bind(source.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create source: {}", e)))?;

        timer.observe_duration();

        info!(
            source_id = %inserted.source_id,
            kind = %inserted.kind,
            amount = %inserted.amount,
            "Allocation source created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id))]
    async fn get_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Option<AllocationSource>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_source"])
            .start_timer();

        let source = sqlx::query_as::<_, AllocationSource>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS}
            FROM allocation_sources
            WHERE company_id = $1 AND source_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get source: {}", e)))?;

        timer.observe_duration();

        Ok(source)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_sources(
        &self,
        company_id: Uuid,
        kind: Option<SourceKind>,
        limit: i32,
    ) -> Result<Vec<AllocationSource>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_sources"])
            .start_timer();

        let limit = limit.clamp(1, 100) as i64;

        let sources = sqlx::query_as::<_, AllocationSource>(&format!(
            r#"
            SELECT {SOURCE_COLUMNS}
            FROM allocation_sources
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR kind = $2)
            ORDER BY received_date DESC, created_utc DESC
            LIMIT $3
            "#,
        ))
        .bind(company_id)
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list sources: {}", e)))?;

        timer.observe_duration();

        Ok(sources)
    }

    #[instrument(skip(self, source), fields(source_id = %source.source_id))]
    async fn update_source(
        &self,
        source: AllocationSource,
        expected_version: i64,
    ) -> Result<Option<AllocationSource>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_source"])
            .start_timer();

        let updated = sqlx::query_as::<_, AllocationSource>(&format!(
            r#"
            UPDATE allocation_sources
            SET amount_applied = $3, status = $4, version = $5, updated_utc = NOW()
            WHERE company_id = $1 AND source_id = $2 AND version = $6
            RETURNING {SOURCE_COLUMNS}
            "#,
        ))
        .bind(source.company_id)
        .bind(source.source_id)
        .bind(source.amount_applied)
        .bind(source.status)
        .bind(source.version)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update source: {}", e)))?;

        timer.observe_duration();

        match updated {
            Some(row) => Ok(Some(row)),
            None => {
                let exists = self.get_source(source.company_id, source.source_id).await?;
                match exists {
                    Some(_) => Err(stale("source", source.source_id)),
                    None => Ok(None),
                }
            }
        }
    }

    #[instrument(skip_all, fields(source_id = %source.source_id, document_count = documents.len()))]
    async fn apply_allocations(
        &self,
        source: AllocationSource,
        expected_source_version: i64,
        documents: Vec<(AllocatableDocument, i64)>,
        allocations: Vec<Allocation>,
    ) -> Result<Vec<Allocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_allocations"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let source_rows = sqlx::query(
            r#"
            UPDATE allocation_sources
            SET amount_applied = $3, status = $4, version = $5, updated_utc = NOW()
            WHERE company_id = $1 AND source_id = $2 AND version = $6
            "#,
        )
        .bind(source.company_id)
        .bind(source.source_id)
        .bind(source.amount_applied)
        .bind(source.status)
        .bind(source.version)
        .bind(expected_source_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update source: {}", e)))?
        .rows_affected();

        if source_rows != 1 {
            return Err(stale("source", source.source_id));
        }

        for (document, expected_version) in &documents {
            let doc_rows = sqlx::query(
                r#"
                UPDATE allocatable_documents
                SET amount_paid = $3, status = $4, version = $5, updated_utc = NOW()
                WHERE company_id = $1 AND document_id = $2 AND version = $6
                "#,
            )
            .bind(document.company_id)
            .bind(document.document_id)
            .bind(document.amount_paid)
            .bind(document.status)
            .bind(document.version)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update document: {}", e))
            })?
            .rows_affected();

            if doc_rows != 1 {
                return Err(stale("document", document.document_id));
            }
        }

        let mut inserted = Vec::with_capacity(allocations.len());
        for allocation in &allocations {
            let row = sqlx::query_as::<_, Allocation>(&format!(
                r#"
                INSERT INTO allocations (allocation_id, company_id, source_id, document_id, amount,
                    created_by, allocated_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {ALLOCATION_COLUMNS}
                "#,
            ))
            .bind(allocation.allocation_id)
            .bind(allocation.company_id)
            .bind(allocation.source_id)
            .bind(allocation.document_id)
            .bind(allocation.amount)
            .bind(&allocation.created_by)
            .bind(allocation.allocated_utc)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert allocation: {}", e))
            })?;
            inserted.push(row);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            source_id = %source.source_id,
            allocation_count = inserted.len(),
            "Allocation batch applied"
        );

        Ok(inserted)
    }

    #[instrument(skip_all, fields(allocation_id = %allocation_id))]
    async fn remove_allocation(
        &self,
        allocation_id: Uuid,
        source: AllocationSource,
        expected_source_version: i64,
        document: AllocatableDocument,
        expected_document_version: i64,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_allocation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let deleted = sqlx::query(
            "DELETE FROM allocations WHERE company_id = $1 AND allocation_id = $2",
        )
        .bind(source.company_id)
        .bind(allocation_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete allocation: {}", e))
        })?
        .rows_affected();

        if deleted != 1 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "allocation {allocation_id} not found"
            )));
        }

        let source_rows = sqlx::query(
            r#"
            UPDATE allocation_sources
            SET amount_applied = $3, status = $4, version = $5, updated_utc = NOW()
            WHERE company_id = $1 AND source_id = $2 AND version = $6
            "#,
        )
        .bind(source.company_id)
        .bind(source.source_id)
        .bind(source.amount_applied)
        .bind(source.status)
        .bind(source.version)
        .bind(expected_source_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update source: {}", e)))?
        .rows_affected();

        if source_rows != 1 {
            return Err(stale("source", source.source_id));
        }

        let doc_rows = sqlx::query(
            r#"
            UPDATE allocatable_documents
            SET amount_paid = $3, status = $4, version = $5, updated_utc = NOW()
            WHERE company_id = $1 AND document_id = $2 AND version = $6
            "#,
        )
        .bind(document.company_id)
        .bind(document.document_id)
        .bind(document.amount_paid)
        .bind(document.status)
        .bind(document.version)
        .bind(expected_document_version)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update document: {}", e)))?
        .rows_affected();

        if doc_rows != 1 {
            return Err(stale("document", document.document_id));
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(allocation_id = %allocation_id, "Allocation reversed");

        Ok(())
    }

    #[instrument(skip(self), fields(company_id = %company_id, allocation_id = %allocation_id))]
    async fn get_allocation(
        &self,
        company_id: Uuid,
        allocation_id: Uuid,
    ) -> Result<Option<Allocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_allocation"])
            .start_timer();

        let allocation = sqlx::query_as::<_, Allocation>(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM allocations
            WHERE company_id = $1 AND allocation_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(allocation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get allocation: {}", e)))?;

        timer.observe_duration();

        Ok(allocation)
    }

    #[instrument(skip(self), fields(company_id = %company_id, source_id = %source_id))]
    async fn allocations_for_source(
        &self,
        company_id: Uuid,
        source_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocations_for_source"])
            .start_timer();

        let allocations = sqlx::query_as::<_, Allocation>(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM allocations
            WHERE company_id = $1 AND source_id = $2
            ORDER BY allocated_utc
            "#,
        ))
        .bind(company_id)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list allocations: {}", e))
        })?;

        timer.observe_duration();

        Ok(allocations)
    }

    #[instrument(skip(self), fields(company_id = %company_id, document_id = %document_id))]
    async fn allocations_for_document(
        &self,
        company_id: Uuid,
        document_id: Uuid,
    ) -> Result<Vec<Allocation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["allocations_for_document"])
            .start_timer();

        let allocations = sqlx::query_as::<_, Allocation>(&format!(
            r#"
            SELECT {ALLOCATION_COLUMNS}
            FROM allocations
            WHERE company_id = $1 AND document_id = $2
            ORDER BY allocated_utc
            "#,
        ))
        .bind(company_id)
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list allocations: {}", e))
        })?;

        timer.observe_duration();

        Ok(allocations)
    }
}
