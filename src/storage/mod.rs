//! Storage layer for analysis reports.
//!
//! Reports are keyed by `(organization, year)`. Organization names are
//! exact-match keys: no case folding, no trimming.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::assessment::StoredReport;
use crate::error::StorageResult;

/// Persistence of analysis results per organization and year.
///
/// Saving an existing key replaces it (last write wins). Implementations
/// must be safe to share across tasks.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert or replace the report at `(report.organization, report.year)`.
    async fn save(&self, report: &StoredReport) -> StorageResult<()>;

    /// Load one report; `ReportNotFound` when the key is absent.
    async fn load(&self, organization: &str, year: i32) -> StorageResult<StoredReport>;

    /// Years stored for an organization, ascending.
    async fn list_years(&self, organization: &str) -> StorageResult<Vec<i32>>;

    /// Every organization with at least one report.
    async fn list_organizations(&self) -> StorageResult<BTreeSet<String>>;

    /// Remove one report; `ReportNotFound` when the key is absent.
    async fn delete(&self, organization: &str, year: i32) -> StorageResult<()>;

    /// All reports of an organization, ascending by year.
    async fn load_all(&self, organization: &str) -> StorageResult<Vec<StoredReport>>;
}
