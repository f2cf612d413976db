use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ReportStore;
use crate::assessment::StoredReport;
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed report store
///
/// Writes go through a single-writer lock; readers only ever observe a
/// complete row because each save is one upsert statement.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        Self::with_pool(pool).await
    }

    /// Create a private in-memory store (for tests and dry runs)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        // One connection that never expires, otherwise the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StorageResult<Self> {
        let storage = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ReportStore for SqliteStorage {
    async fn save(&self, report: &StoredReport) -> StorageResult<()> {
        let result_json = serde_json::to_string(&report.result)?;
        let metadata_json = serde_json::to_string(&report.source_metadata)?;

        let _guard = self.write_lock.lock().await;

        sqlx::query(
            r#"
            INSERT INTO reports (organization, year, result_json, source_metadata_json, saved_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(organization, year) DO UPDATE SET
                result_json = excluded.result_json,
                source_metadata_json = excluded.source_metadata_json,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(&report.organization)
        .bind(report.year)
        .bind(&result_json)
        .bind(&metadata_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            organization = %report.organization,
            year = report.year,
            "Report saved"
        );
        Ok(())
    }

    async fn load(&self, organization: &str, year: i32) -> StorageResult<StoredReport> {
        let row: Option<ReportRow> = sqlx::query_as(
            r#"
            SELECT organization, year, result_json, source_metadata_json
            FROM reports
            WHERE organization = ? AND year = ?
            "#,
        )
        .bind(organization)
        .bind(year)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(StorageError::ReportNotFound {
                organization: organization.to_string(),
                year,
            }),
        }
    }

    async fn list_years(&self, organization: &str) -> StorageResult<Vec<i32>> {
        let years: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT year FROM reports
            WHERE organization = ?
            ORDER BY year ASC
            "#,
        )
        .bind(organization)
        .fetch_all(&self.pool)
        .await?;

        Ok(years)
    }

    async fn list_organizations(&self) -> StorageResult<BTreeSet<String>> {
        let organizations: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT organization FROM reports")
                .fetch_all(&self.pool)
                .await?;

        Ok(organizations.into_iter().collect())
    }

    async fn delete(&self, organization: &str, year: i32) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM reports WHERE organization = ? AND year = ?")
            .bind(organization)
            .bind(year)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ReportNotFound {
                organization: organization.to_string(),
                year,
            });
        }

        debug!(organization = %organization, year, "Report deleted");
        Ok(())
    }

    async fn load_all(&self, organization: &str) -> StorageResult<Vec<StoredReport>> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            r#"
            SELECT organization, year, result_json, source_metadata_json
            FROM reports
            WHERE organization = ?
            ORDER BY year ASC
            "#,
        )
        .bind(organization)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredReport::try_from).collect()
    }
}

// Internal row type for SQLx mapping
#[derive(sqlx::FromRow)]
struct ReportRow {
    organization: String,
    year: i32,
    result_json: String,
    source_metadata_json: String,
}

impl TryFrom<ReportRow> for StoredReport {
    type Error = StorageError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        Ok(Self {
            organization: row.organization,
            year: row.year,
            result: serde_json::from_str(&row.result_json)?,
            source_metadata: serde_json::from_str(&row.source_metadata_json)?,
        })
    }
}
