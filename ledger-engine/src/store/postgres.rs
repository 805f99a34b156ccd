//! PostgreSQL-backed ledger store.

use accounting_core::config::Config;
use accounting_core::error::AppError;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    Account, AccountType, AccountingPeriod, EntryFilter, EntryWithLines, JournalEntry,
    JournalEntryLine, UpdateAccount, YearEndClose,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::store::{BalanceScope, LedgerStore};

const ENTRY_COLUMNS: &str = "entry_id, company_id, reference, transaction_date, description, \
     status, is_closing_entry, created_by, created_utc, posted_utc, voided_utc";

const ACCOUNT_COLUMNS: &str =
    "account_id, company_id, code, name, account_type, is_active, metadata, created_utc";

const PERIOD_COLUMNS: &str = "period_id, company_id, fiscal_year, fiscal_year_start, \
     fiscal_year_end, is_locked, closing_date";

const CLOSE_COLUMNS: &str = "close_id, company_id, fiscal_year, close_date, total_revenue, \
     total_expenses, net_income, retained_earnings_account_id, entry_id, created_by, created_utc";

/// Database connection pool wrapper implementing [`LedgerStore`].
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new store from configuration.
    #[instrument(skip(config), fields(service = "ledger-engine"))]
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

    async fn lines_for_entry(&self, entry_id: Uuid) -> Result<Vec<JournalEntryLine>, AppError> {
        sqlx::query_as::<_, JournalEntryLine>(
            r#"
            SELECT line_id, entry_id, account_id, description, debit, credit
            FROM journal_entry_lines
            WHERE entry_id = $1
            ORDER BY line_id
            "#,
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get lines: {}", e)))
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    #[instrument(skip(self, account), fields(company_id = %account.company_id, code = %account.code))]
    async fn insert_account(&self, account: Account) -> Result<Account, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_account"])
            .start_timer();

        let inserted = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (account_id, company_id, code, name, account_type, is_active, metadata, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ACCOUNT_COLUMNS}
            "#,
        ))
        .bind(account.account_id)
        .bind(account.company_id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(account.is_active)
        .bind(&account.metadata)
        .bind(account.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::StateConflict(anyhow::anyhow!(
                    "Account with code '{}' already exists for company",
                    account.code
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create account: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            account_id = %inserted.account_id,
            account_type = %inserted.account_type,
            "Account created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, account_id = %account_id))]
    async fn get_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
    ) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE company_id = $1 AND account_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self, account_ids), fields(company_id = %company_id, count = account_ids.len()))]
    async fn accounts_by_ids(
        &self,
        company_id: Uuid,
        account_ids: &[Uuid],
    ) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["accounts_by_ids"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE company_id = $1 AND account_id = ANY($2)
            "#,
        ))
        .bind(company_id)
        .bind(account_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_accounts(
        &self,
        company_id: Uuid,
        account_type: Option<AccountType>,
        active_only: bool,
    ) -> Result<Vec<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let accounts = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR account_type = $2)
              AND (NOT $3 OR is_active)
            ORDER BY code
            "#,
        ))
        .bind(company_id)
        .bind(account_type)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list accounts: {}", e)))?;

        timer.observe_duration();

        Ok(accounts)
    }

    #[instrument(skip(self, update), fields(company_id = %company_id, account_id = %account_id))]
    async fn update_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        update: &UpdateAccount,
    ) -> Result<Option<Account>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            UPDATE accounts
            SET name = COALESCE($3, name),
                is_active = COALESCE($4, is_active)
            WHERE company_id = $1 AND account_id = $2
            RETURNING {ACCOUNT_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(account_id)
        .bind(&update.name)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self, entry, lines), fields(entry_id = %entry.entry_id, line_count = lines.len()))]
    async fn insert_entry(
        &self,
        entry: JournalEntry,
        lines: Vec<JournalEntryLine>,
    ) -> Result<EntryWithLines, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_entry"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let inserted = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            INSERT INTO journal_entries (entry_id, company_id, reference, transaction_date, description,
                status, is_closing_entry, created_by, created_utc, posted_utc, voided_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ENTRY_COLUMNS}
            "#,
        ))
        .bind(entry.entry_id)
        .bind(entry.company_id)
        .bind(&entry.reference)
        .bind(entry.transaction_date)
        .bind(&entry.description)
        .bind(entry.status)
        .bind(entry.is_closing_entry)
        .bind(&entry.created_by)
        .bind(entry.created_utc)
        .bind(entry.posted_utc)
        .bind(entry.voided_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert entry: {}", e)))?;

        let mut inserted_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            let inserted_line = sqlx::query_as::<_, JournalEntryLine>(
                r#"
                INSERT INTO journal_entry_lines (line_id, entry_id, account_id, description, debit, credit)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING line_id, entry_id, account_id, description, debit, credit
                "#,
            )
            .bind(line.line_id)
            .bind(line.entry_id)
            .bind(line.account_id)
            .bind(&line.description)
            .bind(line.debit)
            .bind(line.credit)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert line: {}", e))
            })?;
            inserted_lines.push(inserted_line);
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            entry_id = %inserted.entry_id,
            reference = %inserted.reference,
            line_count = inserted_lines.len(),
            "Journal entry persisted"
        );

        Ok(EntryWithLines {
            entry: inserted,
            lines: inserted_lines,
        })
    }

    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    async fn get_entry(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<EntryWithLines>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_entry"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM journal_entries
            WHERE company_id = $1 AND entry_id = $2
            "#,
        ))
        .bind(company_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get entry: {}", e)))?;

        let result = match entry {
            Some(entry) => {
                let lines = self.lines_for_entry(entry.entry_id).await?;
                Some(EntryWithLines { entry, lines })
            }
            None => None,
        };

        timer.observe_duration();

        Ok(result)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_entries(
        &self,
        company_id: Uuid,
        filter: &EntryFilter,
    ) -> Result<Vec<EntryWithLines>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let limit = filter.limit.clamp(1, 100) as i64;

        let entries = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM journal_entries e
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::date IS NULL OR transaction_date >= $3)
              AND ($4::date IS NULL OR transaction_date <= $4)
              AND ($5::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM journal_entry_lines l
                    WHERE l.entry_id = e.entry_id AND l.account_id = $5))
            ORDER BY transaction_date DESC, created_utc DESC
            LIMIT $6
            "#,
        ))
        .bind(company_id)
        .bind(filter.status)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list entries: {}", e)))?;

        let mut result = Vec::with_capacity(entries.len());
        for entry in entries {
            let lines = self.lines_for_entry(entry.entry_id).await?;
            result.push(EntryWithLines { entry, lines });
        }

        timer.observe_duration();

        Ok(result)
    }

    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    async fn mark_posted(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_posted"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            UPDATE journal_entries
            SET status = 'posted', posted_utc = NOW()
            WHERE company_id = $1 AND entry_id = $2 AND status = 'draft'
            RETURNING {ENTRY_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to post entry: {}", e)))?;

        timer.observe_duration();

        if let Some(ref e) = entry {
            info!(entry_id = %e.entry_id, reference = %e.reference, "Draft entry posted");
        }

        Ok(entry)
    }

    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    async fn mark_voided(
        &self,
        company_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<JournalEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_voided"])
            .start_timer();

        let entry = sqlx::query_as::<_, JournalEntry>(&format!(
            r#"
            UPDATE journal_entries
            SET status = 'voided', voided_utc = NOW()
            WHERE company_id = $1 AND entry_id = $2 AND status = 'posted'
            RETURNING {ENTRY_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to void entry: {}", e)))?;

        timer.observe_duration();

        if let Some(ref e) = entry {
            info!(entry_id = %e.entry_id, reference = %e.reference, "Entry voided");
        }

        Ok(entry)
    }

    #[instrument(skip(self), fields(company_id = %company_id, entry_id = %entry_id))]
    async fn delete_draft(&self, company_id: Uuid, entry_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_draft"])
            .start_timer();

        // Lines go with the entry via ON DELETE CASCADE.
        let deleted = sqlx::query(
            r#"
            DELETE FROM journal_entries
            WHERE company_id = $1 AND entry_id = $2 AND status = 'draft'
            "#,
        )
        .bind(company_id)
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete draft: {}", e)))?
        .rows_affected()
            > 0;

        timer.observe_duration();

        Ok(deleted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, account_id = %account_id))]
    async fn lines_for_account(
        &self,
        company_id: Uuid,
        account_id: Uuid,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        scope: BalanceScope,
    ) -> Result<Vec<JournalEntryLine>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lines_for_account"])
            .start_timer();

        let include_closing = scope == BalanceScope::Cumulative;

        let lines = sqlx::query_as::<_, JournalEntryLine>(
            r#"
            SELECT l.line_id, l.entry_id, l.account_id, l.description, l.debit, l.credit
            FROM journal_entry_lines l
            JOIN journal_entries e ON e.entry_id = l.entry_id
            WHERE e.company_id = $1
              AND l.account_id = $2
              AND e.status = 'posted'
              AND ($3::date IS NULL OR e.transaction_date >= $3)
              AND ($4::date IS NULL OR e.transaction_date <= $4)
              AND ($5 OR NOT e.is_closing_entry)
            ORDER BY e.transaction_date, e.created_utc, l.line_id
            "#,
        )
        .bind(company_id)
        .bind(account_id)
        .bind(start_date)
        .bind(end_date)
        .bind(include_closing)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get account lines: {}", e))
        })?;

        timer.observe_duration();

        Ok(lines)
    }

    #[instrument(skip(self, period), fields(company_id = %period.company_id, fiscal_year = period.fiscal_year))]
    async fn insert_period(
        &self,
        period: AccountingPeriod,
    ) -> Result<AccountingPeriod, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_period"])
            .start_timer();

        let inserted = sqlx::query_as::<_, AccountingPeriod>(&format!(
            r#"
            INSERT INTO accounting_periods (period_id, company_id, fiscal_year, fiscal_year_start,
                fiscal_year_end, is_locked, closing_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PERIOD_COLUMNS}
            "#,
        ))
        .bind(period.period_id)
        .bind(period.company_id)
        .bind(period.fiscal_year)
        .bind(period.fiscal_year_start)
        .bind(period.fiscal_year_end)
        .bind(period.is_locked)
        .bind(period.closing_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::StateConflict(anyhow::anyhow!(
                    "Accounting period for fiscal year {} already exists",
                    period.fiscal_year
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create period: {}", e)),
        })?;

        timer.observe_duration();

        info!(
            period_id = %inserted.period_id,
            fiscal_year = inserted.fiscal_year,
            "Accounting period created"
        );

        Ok(inserted)
    }

    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    async fn get_period(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_period"])
            .start_timer();

        let period = sqlx::query_as::<_, AccountingPeriod>(&format!(
            r#"
            SELECT {PERIOD_COLUMNS}
            FROM accounting_periods
            WHERE company_id = $1 AND fiscal_year = $2
            "#,
        ))
        .bind(company_id)
        .bind(fiscal_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get period: {}", e)))?;

        timer.observe_duration();

        Ok(period)
    }

    #[instrument(skip(self), fields(company_id = %company_id, date = %date))]
    async fn period_containing(
        &self,
        company_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["period_containing"])
            .start_timer();

        let period = sqlx::query_as::<_, AccountingPeriod>(&format!(
            r#"
            SELECT {PERIOD_COLUMNS}
            FROM accounting_periods
            WHERE company_id = $1 AND fiscal_year_start <= $2 AND fiscal_year_end >= $2
            "#,
        ))
        .bind(company_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get period: {}", e)))?;

        timer.observe_duration();

        Ok(period)
    }

    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year, locked = locked))]
    async fn set_period_locked(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
        locked: bool,
        closing_date: Option<NaiveDate>,
    ) -> Result<Option<AccountingPeriod>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_period_locked"])
            .start_timer();

        let period = sqlx::query_as::<_, AccountingPeriod>(&format!(
            r#"
            UPDATE accounting_periods
            SET is_locked = $3, closing_date = $4
            WHERE company_id = $1 AND fiscal_year = $2
            RETURNING {PERIOD_COLUMNS}
            "#,
        ))
        .bind(company_id)
        .bind(fiscal_year)
        .bind(locked)
        .bind(closing_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update period: {}", e)))?;

        timer.observe_duration();

        if let Some(ref p) = period {
            info!(fiscal_year = p.fiscal_year, locked = p.is_locked, "Period lock updated");
        }

        Ok(period)
    }

    #[instrument(skip(self), fields(company_id = %company_id, fiscal_year = fiscal_year))]
    async fn get_year_end_close(
        &self,
        company_id: Uuid,
        fiscal_year: i32,
    ) -> Result<Option<YearEndClose>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_year_end_close"])
            .start_timer();

        let close = sqlx::query_as::<_, YearEndClose>(&format!(
            r#"
            SELECT {CLOSE_COLUMNS}
            FROM year_end_closes
            WHERE company_id = $1 AND fiscal_year = $2
            "#,
        ))
        .bind(company_id)
        .bind(fiscal_year)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get close: {}", e)))?;

        timer.observe_duration();

        Ok(close)
    }

    #[instrument(skip(self, close, entry), fields(company_id = %close.company_id, fiscal_year = close.fiscal_year))]
    async fn record_year_end_close(
        &self,
        close: YearEndClose,
        entry: Option<(JournalEntry, Vec<JournalEntryLine>)>,
        lock_period: bool,
    ) -> Result<YearEndClose, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_year_end_close"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        if let Some((entry, lines)) = &entry {
            sqlx::query(
                r#"
                INSERT INTO journal_entries (entry_id, company_id, reference, transaction_date, description,
                    status, is_closing_entry, created_by, created_utc, posted_utc, voided_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(entry.entry_id)
            .bind(entry.company_id)
            .bind(&entry.reference)
            .bind(entry.transaction_date)
            .bind(&entry.description)
            .bind(entry.status)
            .bind(entry.is_closing_entry)
            .bind(&entry.created_by)
            .bind(entry.created_utc)
            .bind(entry.posted_utc)
            .bind(entry.voided_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert closing entry: {}", e))
            })?;

            for line in lines {
                sqlx::query(
                    r#"
                    INSERT INTO journal_entry_lines (line_id, entry_id, account_id, description, debit, credit)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(line.line_id)
                .bind(line.entry_id)
                .bind(line.account_id)
                .bind(&line.description)
                .bind(line.debit)
                .bind(line.credit)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to insert closing line: {}", e))
                })?;
            }
        }

        let inserted = sqlx::query_as::<_, YearEndClose>(&format!(
            r#"
            INSERT INTO year_end_closes (close_id, company_id, fiscal_year, close_date, total_revenue,
                total_expenses, net_income, retained_earnings_account_id, entry_id, created_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {CLOSE_COLUMNS}
            "#,
        ))
        .bind(close.close_id)
        .bind(close.company_id)
        .bind(close.fiscal_year)
        .bind(close.close_date)
        .bind(close.total_revenue)
        .bind(close.total_expenses)
        .bind(close.net_income)
        .bind(close.retained_earnings_account_id)
        .bind(close.entry_id)
        .bind(&close.created_by)
        .bind(close.created_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::StateConflict(anyhow::anyhow!(
                    "Fiscal year {} is already closed",
                    close.fiscal_year
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to record close: {}", e)),
        })?;

        if lock_period {
            sqlx::query(
                r#"
                UPDATE accounting_periods
                SET is_locked = TRUE, closing_date = $3
                WHERE company_id = $1 AND fiscal_year = $2
                "#,
            )
            .bind(close.company_id)
            .bind(close.fiscal_year)
            .bind(close.close_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to lock period: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            close_id = %inserted.close_id,
            fiscal_year = inserted.fiscal_year,
            net_income = %inserted.net_income,
            "Year-end close recorded"
        );

        Ok(inserted)
    }
}
