//! PostgreSQL-backed reconciliation store.

use accounting_core::config::Config;
use accounting_core::error::AppError;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    BankReconciliation, ReconciliationItem, ReconciliationStatus, ReconciliationSummary,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::store::{CompleteOutcome, ReconciliationStore, ToggleOutcome};

const RECONCILIATION_COLUMNS: &str = "reconciliation_id, company_id, bank_account_id, \
     statement_date, statement_ending_balance, beginning_balance, status, started_utc, \
     completed_utc";

const ITEM_COLUMNS: &str = "item_id, reconciliation_id, source, source_ref, item_date, \
     description, amount, is_cleared, cleared_utc";

/// Database connection pool wrapper implementing [`ReconciliationStore`].
#[derive(Clone)]
pub struct PgReconciliationStore {
    pool: PgPool,
}

impl PgReconciliationStore {
    /// Create a new store from configuration.
    #[instrument(skip(config), fields(service = "reconciliation-engine"))]
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
impl ReconciliationStore for PgReconciliationStore {
    #[instrument(skip(self, reconciliation, items), fields(reconciliation_id = %reconciliation.reconciliation_id, item_count = items.len()))]
    async fn insert_reconciliation(
        &self,
        reconciliation: BankReconciliation,
        items: Vec<ReconciliationItem>,
    ) -> Result<BankReconciliation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_reconciliation"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let inserted = sqlx::query_as::<_, BankReconciliation>(&format!(
            r#"
            INSERT INTO reconciliations (reconciliation_id, company_id, bank_account_id,
                statement_date, statement_ending_balance, beginning_balance, status,
                started_utc, completed_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {RECONCILIATION_COLUMNS}
            "#,
        ))
        .bind(reconciliation.reconciliation_id)
        .bind(reconciliation.company_id)
        .bind(reconciliation.bank_account_id)
        .bind(reconciliation.statement_date)
        .bind(reconciliation.statement_ending_balance)
        .bind(reconciliation.beginning_balance)
        .bind(reconciliation.status)
        .bind(reconciliation.started_utc)
        .bind(reconciliation.completed_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert reconciliation: {}", e))
        })?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO reconciliation_items (item_id, reconciliation_id, source, source_ref,
                    item_date, description, amount, is_cleared, cleared_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.item_id)
            .bind(item.reconciliation_id)
            .bind(item.source)
            .bind(item.source_ref)
            .bind(item.item_date)
            .bind(&item.description)
            .bind(item.amount)
            .bind(item.is_cleared)
            .bind(item.cleared_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert item: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            reconciliation_id = %inserted.reconciliation_id,
            item_count = items.len(),
            "Reconciliation started"
        );

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, reconciliation_id = %reconciliation_id))]
    async fn get_reconciliation(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Option<BankReconciliation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_reconciliation"])
            .start_timer();

        let reconciliation = sqlx::query_as::<_, BankReconciliation>(&format!(
            r#"
            SELECT {RECONCILIATION_COLUMNS}
            FROM reconciliations
            WHERE company_id = $1 AND reconciliation_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(reconciliation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get reconciliation: {}", e))
        })?;

        timer.observe_duration();

        Ok(reconciliation)
    }

    #[instrument(skip(self), fields(company_id = %company_id, bank_account_id = %bank_account_id))]
    async fn list_reconciliations(
        &self,
        company_id: Uuid,
        bank_account_id: Uuid,
        limit: i32,
    ) -> Result<Vec<BankReconciliation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_reconciliations"])
            .start_timer();

        let limit = limit.clamp(1, 100) as i64;

        let reconciliations = sqlx::query_as::<_, BankReconciliation>(&format!(
            r#"
            SELECT {RECONCILIATION_COLUMNS}
            FROM reconciliations
            WHERE company_id = $1 AND bank_account_id = $2
            ORDER BY statement_date DESC
            LIMIT $3
            "#,
        ))
        .bind(company_id)
        .bind(bank_account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list reconciliations: {}", e))
        })?;

        timer.observe_duration();

        Ok(reconciliations)
    }

    #[instrument(skip(self), fields(company_id = %company_id, reconciliation_id = %reconciliation_id))]
    async fn items(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<Vec<ReconciliationItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["items"])
            .start_timer();

        let items = sqlx::query_as::<_, ReconciliationItem>(
            r#"
            SELECT i.item_id, i.reconciliation_id, i.source, i.source_ref, i.item_date,
                i.description, i.amount, i.is_cleared, i.cleared_utc
            FROM reconciliation_items i
            JOIN reconciliations r ON r.reconciliation_id = i.reconciliation_id
            WHERE r.company_id = $1 AND i.reconciliation_id = $2
            ORDER BY i.item_date, i.item_id
            "#,
        )
        .bind(company_id)
        .bind(reconciliation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self), fields(company_id = %company_id, item_id = %item_id))]
    async fn get_item(
        &self,
        company_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_item"])
            .start_timer();

        let item = sqlx::query_as::<_, ReconciliationItem>(
            r#"
            SELECT i.item_id, i.reconciliation_id, i.source, i.source_ref, i.item_date,
                i.description, i.amount, i.is_cleared, i.cleared_utc
            FROM reconciliation_items i
            JOIN reconciliations r ON r.reconciliation_id = i.reconciliation_id
            WHERE r.company_id = $1 AND i.item_id = $2
            "#,
        )
        .bind(company_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get item: {}", e)))?;

        timer.observe_duration();

        Ok(item)
    }

    #[instrument(skip(self), fields(company_id = %company_id, item_id = %item_id, cleared = cleared))]
    async fn set_item_cleared(
        &self,
        company_id: Uuid,
        item_id: Uuid,
        cleared: bool,
    ) -> Result<ToggleOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_item_cleared"])
            .start_timer();

        // Single-row conditional write; repeated toggles keep the original
        // cleared timestamp.
        let updated = sqlx::query_as::<_, ReconciliationItem>(
            r#"
            UPDATE reconciliation_items i
            SET is_cleared = $3,
                cleared_utc = CASE WHEN $3 THEN COALESCE(i.cleared_utc, NOW()) ELSE NULL END
            FROM reconciliations r
            WHERE i.item_id = $2
              AND r.reconciliation_id = i.reconciliation_id
              AND r.company_id = $1
              AND r.status = 'in_progress'
            RETURNING i.item_id, i.reconciliation_id, i.source, i.source_ref, i.item_date,
                i.description, i.amount, i.is_cleared, i.cleared_utc
            "#,
        )
        .bind(company_id)
        .bind(item_id)
        .bind(cleared)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to toggle item: {}", e)))?;

        timer.observe_duration();

        match updated {
            Some(item) => Ok(ToggleOutcome::Updated(item)),
            None => match self.get_item(company_id, item_id).await? {
                Some(_) => Ok(ToggleOutcome::Completed),
                None => Ok(ToggleOutcome::NotFound),
            },
        }
    }

    #[instrument(skip(self), fields(company_id = %company_id, reconciliation_id = %reconciliation_id))]
    async fn complete(
        &self,
        company_id: Uuid,
        reconciliation_id: Uuid,
    ) -> Result<CompleteOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Lock the row, then decide against the items as they exist now so
        // a stale cleared-total can never slip through.
        let reconciliation = sqlx::query_as::<_, BankReconciliation>(&format!(
            r#"
            SELECT {RECONCILIATION_COLUMNS}
            FROM reconciliations
            WHERE company_id = $1 AND reconciliation_id = $2
            FOR UPDATE
            "#,
        ))
        .bind(company_id)
        .bind(reconciliation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to lock reconciliation: {}", e))
        })?;

        let Some(reconciliation) = reconciliation else {
            return Ok(CompleteOutcome::NotFound);
        };
        if reconciliation.status == ReconciliationStatus::Completed {
            return Ok(CompleteOutcome::AlreadyCompleted);
        }

        let items = sqlx::query_as::<_, ReconciliationItem>(&format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM reconciliation_items
            WHERE reconciliation_id = $1
            "#,
        ))
        .bind(reconciliation_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get items: {}", e)))?;

        let summary = ReconciliationSummary::compute(&reconciliation, &items);
        if !summary.balanced {
            return Ok(CompleteOutcome::NotBalanced {
                difference: summary.difference,
            });
        }

        let completed = sqlx::query_as::<_, BankReconciliation>(&format!(
            r#"
            UPDATE reconciliations
            SET status = 'completed', completed_utc = NOW()
            WHERE company_id = $1 AND reconciliation_id = $2
            RETURNING {RECONCILIATION_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(reconciliation_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to complete reconciliation: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            reconciliation_id = %completed.reconciliation_id,
            cleared_balance = %summary.cleared_balance,
            "Reconciliation completed"
        );

        Ok(CompleteOutcome::Completed(completed))
    }
}
