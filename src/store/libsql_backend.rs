//! libSQL backend — async `ErrorStore` implementation.
//!
//! Supports local file and in-memory databases. All statement execution is
//! serialized through one mutex per store instance; SQLite has no safe
//! concurrent-writer story on a single connection, and reads share the lock
//! for correctness over throughput.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::context::ErrorContext;
use crate::error::StoreError;
use crate::model::{ErrorCategory, ErrorRecord, ErrorSeverity, RecoveryStrategy};
use crate::store::migrations;
use crate::store::traits::{ErrorFilter, ErrorStore, StoreStats};

/// libSQL error store.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lock: Mutex<()>,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to open error database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        };
        migrations::run_migrations(&store.conn).await?;
        info!(path = %path.display(), "Error store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Pool(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Pool(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        };
        migrations::run_migrations(&store.conn).await?;
        Ok(store)
    }
}

// ── Helper functions ────────────────────────────────────────────────

const ERROR_COLUMNS: &str = "id, timestamp, category, severity, exception_type, \
     exception_message, traceback, component, operation, context, \
     recovery_strategy, recovery_attempted, recovery_successful, \
     recovery_attempts, max_recovery_attempts, resolved, resolved_at, notes";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_bool_int(b: Option<bool>) -> libsql::Value {
    match b {
        Some(b) => libsql::Value::Integer(b as i64),
        None => libsql::Value::Null,
    }
}

/// Escape LIKE wildcards in a user-supplied ID prefix. Record IDs contain
/// underscores, which LIKE would otherwise treat as single-char wildcards.
fn escape_like(prefix: &str) -> String {
    prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Map a libsql Row (in ERROR_COLUMNS order) to an ErrorRecord.
fn row_to_record(row: &libsql::Row) -> Result<ErrorRecord, libsql::Error> {
    let timestamp_str: String = row.get(1)?;
    let category_str: String = row.get(2)?;
    let severity_str: String = row.get(3)?;
    let context_str: String = row.get(9)?;
    let strategy_str: String = row.get(10)?;
    let recovery_attempted: i64 = row.get(11)?;
    let recovery_successful: Option<i64> = row.get(12).ok();
    let recovery_attempts: i64 = row.get(13)?;
    let max_recovery_attempts: i64 = row.get(14)?;
    let resolved: i64 = row.get(15)?;
    let resolved_at_str: Option<String> = row.get(16).ok();

    let context: ErrorContext = serde_json::from_str(&context_str).unwrap_or_default();

    Ok(ErrorRecord {
        id: row.get(0)?,
        timestamp: parse_datetime(&timestamp_str),
        category: category_str.parse().unwrap_or(ErrorCategory::Unknown),
        severity: severity_str.parse().unwrap_or(ErrorSeverity::Medium),
        exception_type: row.get(4)?,
        exception_message: row.get(5)?,
        traceback: row.get(6)?,
        component: row.get(7)?,
        operation: row.get(8)?,
        context,
        recovery_strategy: strategy_str.parse().unwrap_or(RecoveryStrategy::Manual),
        recovery_attempted: recovery_attempted != 0,
        recovery_successful: recovery_successful.map(|v| v != 0),
        recovery_attempts: recovery_attempts as u32,
        max_recovery_attempts: max_recovery_attempts as u32,
        resolved: resolved != 0,
        resolved_at: resolved_at_str.as_deref().map(parse_datetime),
        notes: row.get(17)?,
    })
}

/// Build `WHERE ...` SQL and positional params for a filter.
fn filter_clause(filter: &ErrorFilter) -> (String, Vec<libsql::Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(category) = filter.category {
        values.push(libsql::Value::Text(category.as_str().to_string()));
        clauses.push(format!("category = ?{}", values.len()));
    }
    if let Some(severity) = filter.severity {
        values.push(libsql::Value::Text(severity.as_str().to_string()));
        clauses.push(format!("severity = ?{}", values.len()));
    }
    if let Some(resolved) = filter.resolved {
        values.push(libsql::Value::Integer(resolved as i64));
        clauses.push(format!("resolved = ?{}", values.len()));
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (sql, values)
}

impl LibSqlStore {
    async fn fetch_one(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Option<ErrorRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| StoreError::Query(format!("fetch: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let record = row_to_record(&row)
                    .map_err(|e| StoreError::Query(format!("row parse: {e}")))?;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("fetch: {e}"))),
        }
    }

    async fn count_where(
        &self,
        where_sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM errors{where_sql}");
        let mut rows = self
            .conn
            .query(&sql, params)
            .await
            .map_err(|e| StoreError::Query(format!("count: {e}")))?;
        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("count: {e}")))?
            .ok_or_else(|| StoreError::Query("count returned no row".into()))?;
        let count: i64 = row
            .get(0)
            .map_err(|e| StoreError::Query(format!("count parse: {e}")))?;
        Ok(count as u64)
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ErrorStore for LibSqlStore {
    async fn save_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let context_json = serde_json::to_string(&record.context)
            .map_err(|e| StoreError::Serialization(format!("context: {e}")))?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO errors (id, timestamp, category, severity, \
                 exception_type, exception_message, traceback, component, operation, \
                 context, recovery_strategy, recovery_attempted, recovery_successful, \
                 recovery_attempts, max_recovery_attempts, resolved, resolved_at, notes) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    record.id.clone(),
                    record.timestamp.to_rfc3339(),
                    record.category.as_str(),
                    record.severity.as_str(),
                    record.exception_type.clone(),
                    record.exception_message.clone(),
                    record.traceback.clone(),
                    record.component.clone(),
                    record.operation.clone(),
                    context_json,
                    record.recovery_strategy.as_str(),
                    record.recovery_attempted as i64,
                    opt_bool_int(record.recovery_successful),
                    record.recovery_attempts as i64,
                    record.max_recovery_attempts as i64,
                    record.resolved as i64,
                    opt_text_owned(record.resolved_at.map(|t| t.to_rfc3339())),
                    record.notes.clone(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("save_error: {e}")))?;

        debug!(error_id = %record.id, "Error record saved");
        Ok(())
    }

    async fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        self.fetch_one(
            &format!("SELECT {ERROR_COLUMNS} FROM errors WHERE id = ?1"),
            params![id],
        )
        .await
    }

    async fn get_error_by_prefix(&self, prefix: &str) -> Result<Option<ErrorRecord>, StoreError> {
        let _guard = self.lock.lock().await;

        if let Some(exact) = self
            .fetch_one(
                &format!("SELECT {ERROR_COLUMNS} FROM errors WHERE id = ?1"),
                params![prefix],
            )
            .await?
        {
            return Ok(Some(exact));
        }

        let pattern = format!("{}%", escape_like(prefix));
        self.fetch_one(
            &format!(
                "SELECT {ERROR_COLUMNS} FROM errors WHERE id LIKE ?1 ESCAPE '\\' \
                 ORDER BY timestamp DESC LIMIT 1"
            ),
            params![pattern],
        )
        .await
    }

    async fn get_recent_errors(
        &self,
        limit: usize,
        filter: &ErrorFilter,
    ) -> Result<Vec<ErrorRecord>, StoreError> {
        let _guard = self.lock.lock().await;

        let (where_sql, mut values) = filter_clause(filter);
        values.push(libsql::Value::Integer(limit as i64));
        let sql = format!(
            "SELECT {ERROR_COLUMNS} FROM errors{where_sql} \
             ORDER BY timestamp DESC LIMIT ?{}",
            values.len()
        );

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(values))
            .await
            .map_err(|e| StoreError::Query(format!("get_recent_errors: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("get_recent_errors: {e}")))?
        {
            records.push(
                row_to_record(&row)
                    .map_err(|e| StoreError::Query(format!("row parse: {e}")))?,
            );
        }
        Ok(records)
    }

    async fn get_error_count(&self, filter: &ErrorFilter) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        let (where_sql, values) = filter_clause(filter);
        self.count_where(&where_sql, libsql::params_from_iter(values))
            .await
    }

    async fn get_error_stats(&self) -> Result<StoreStats, StoreError> {
        let _guard = self.lock.lock().await;

        let mut stats = StoreStats {
            total: self.count_where("", ()).await?,
            resolved: self.count_where(" WHERE resolved = 1", ()).await?,
            recovery_attempted: self
                .count_where(" WHERE recovery_attempted = 1", ())
                .await?,
            recovery_successful: self
                .count_where(" WHERE recovery_successful = 1", ())
                .await?,
            ..Default::default()
        };
        stats.unresolved = stats.total - stats.resolved;

        let mut rows = self
            .conn
            .query("SELECT category, COUNT(*) FROM errors GROUP BY category", ())
            .await
            .map_err(|e| StoreError::Query(format!("stats by category: {e}")))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("stats by category: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("stats parse: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| StoreError::Query(format!("stats parse: {e}")))?;
            if let Ok(category) = name.parse::<ErrorCategory>() {
                stats.by_category.insert(category, count as u64);
            }
        }

        let mut rows = self
            .conn
            .query("SELECT severity, COUNT(*) FROM errors GROUP BY severity", ())
            .await
            .map_err(|e| StoreError::Query(format!("stats by severity: {e}")))?;
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(format!("stats by severity: {e}")))?
        {
            let name: String = row
                .get(0)
                .map_err(|e| StoreError::Query(format!("stats parse: {e}")))?;
            let count: i64 = row
                .get(1)
                .map_err(|e| StoreError::Query(format!("stats parse: {e}")))?;
            if let Ok(severity) = name.parse::<ErrorSeverity>() {
                stats.by_severity.insert(severity, count as u64);
            }
        }

        Ok(stats)
    }

    async fn clear_resolved_errors(&self, older_than_days: u32) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;

        let cutoff = Utc::now() - chrono::Duration::days(older_than_days as i64);
        let deleted = self
            .conn
            .execute(
                "DELETE FROM errors WHERE resolved = 1 AND resolved_at IS NOT NULL \
                 AND datetime(resolved_at) < datetime(?1)",
                params![cutoff.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("clear_resolved_errors: {e}")))?;

        if deleted > 0 {
            info!(deleted, older_than_days, "Swept resolved error records");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_MAX_RECOVERY_ATTEMPTS, generate_error_id};

    fn record(category: ErrorCategory, severity: ErrorSeverity, message: &str) -> ErrorRecord {
        let now = Utc::now();
        ErrorRecord {
            id: generate_error_id(category, now),
            timestamp: now,
            category,
            severity,
            exception_type: "test_error".into(),
            exception_message: message.into(),
            traceback: String::new(),
            component: "test".into(),
            operation: "op".into(),
            context: ErrorContext::new().with("attempt", &1),
            recovery_strategy: RecoveryStrategy::Retry,
            recovery_attempted: false,
            recovery_successful: None,
            recovery_attempts: 0,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            resolved: false,
            resolved_at: None,
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn save_and_get_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let r = record(ErrorCategory::Imap, ErrorSeverity::High, "connection refused");
        store.save_error(&r).await.unwrap();

        let loaded = store.get_error(&r.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, r.id);
        assert_eq!(loaded.category, ErrorCategory::Imap);
        assert_eq!(loaded.severity, ErrorSeverity::High);
        assert_eq!(loaded.exception_message, "connection refused");
        assert_eq!(loaded.context.get("attempt"), Some(&serde_json::json!(1)));
        assert_eq!(loaded.recovery_successful, None);
        assert!(!loaded.resolved);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = LibSqlStore::new_memory().await.unwrap();
        assert!(store.get_error("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_last_write_wins() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut r = record(ErrorCategory::Ai, ErrorSeverity::Medium, "rate limit");
        store.save_error(&r).await.unwrap();

        r.recovery_attempted = true;
        r.recovery_attempts = 2;
        r.recovery_successful = Some(true);
        r.resolved = true;
        r.resolved_at = Some(Utc::now());
        r.notes = "recovered".into();
        store.save_error(&r).await.unwrap();

        assert_eq!(store.get_error_count(&ErrorFilter::new()).await.unwrap(), 1);
        let loaded = store.get_error(&r.id).await.unwrap().unwrap();
        assert_eq!(loaded.recovery_attempts, 2);
        assert_eq!(loaded.recovery_successful, Some(true));
        assert!(loaded.resolved);
        assert!(loaded.resolved_at.is_some());
        assert_eq!(loaded.notes, "recovered");
    }

    #[tokio::test]
    async fn recent_errors_newest_first_with_filters() {
        let store = LibSqlStore::new_memory().await.unwrap();
        for i in 0..5 {
            let mut r = record(ErrorCategory::Imap, ErrorSeverity::High, "refused");
            r.timestamp = Utc::now() + chrono::Duration::milliseconds(i);
            r.id = format!("imap_{i}");
            store.save_error(&r).await.unwrap();
        }
        let mut other = record(ErrorCategory::Validation, ErrorSeverity::Low, "bad date");
        other.resolved = true;
        other.resolved_at = Some(Utc::now());
        store.save_error(&other).await.unwrap();

        let recent = store
            .get_recent_errors(3, &ErrorFilter::new())
            .await
            .unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].timestamp >= recent[1].timestamp);
        assert!(recent[1].timestamp >= recent[2].timestamp);

        let imap_only = store
            .get_recent_errors(10, &ErrorFilter::new().category(ErrorCategory::Imap))
            .await
            .unwrap();
        assert_eq!(imap_only.len(), 5);

        let combined = store
            .get_recent_errors(
                10,
                &ErrorFilter::new()
                    .category(ErrorCategory::Validation)
                    .severity(ErrorSeverity::Low)
                    .resolved(true),
            )
            .await
            .unwrap();
        assert_eq!(combined.len(), 1);

        let none = store
            .get_recent_errors(
                10,
                &ErrorFilter::new()
                    .category(ErrorCategory::Validation)
                    .resolved(false),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn prefix_lookup() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let r = record(ErrorCategory::Network, ErrorSeverity::High, "reset");
        store.save_error(&r).await.unwrap();

        let prefix = &r.id[..r.id.len() - 2];
        let found = store.get_error_by_prefix(prefix).await.unwrap().unwrap();
        assert_eq!(found.id, r.id);

        // Underscores in the prefix must match literally, not as wildcards.
        assert!(
            store
                .get_error_by_prefix("network_x")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn stats_aggregates() {
        let store = LibSqlStore::new_memory().await.unwrap();

        let mut a = record(ErrorCategory::Imap, ErrorSeverity::High, "refused");
        a.recovery_attempted = true;
        a.recovery_successful = Some(true);
        a.resolved = true;
        a.resolved_at = Some(Utc::now());
        store.save_error(&a).await.unwrap();

        let mut b = record(ErrorCategory::Imap, ErrorSeverity::Critical, "auth failed");
        b.recovery_attempted = true;
        b.recovery_successful = Some(false);
        store.save_error(&b).await.unwrap();

        store
            .save_error(&record(ErrorCategory::Ai, ErrorSeverity::Medium, "rate limit"))
            .await
            .unwrap();

        let stats = store.get_error_stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category[&ErrorCategory::Imap], 2);
        assert_eq!(stats.by_category[&ErrorCategory::Ai], 1);
        assert_eq!(stats.by_severity[&ErrorSeverity::Medium], 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unresolved, 2);
        assert_eq!(stats.recovery_attempted, 2);
        assert_eq!(stats.recovery_successful, 1);
    }

    #[tokio::test]
    async fn retention_sweeps_only_old_resolved_rows() {
        let store = LibSqlStore::new_memory().await.unwrap();

        // Old and resolved — swept.
        let mut old_resolved = record(ErrorCategory::Ai, ErrorSeverity::Medium, "rate limit");
        old_resolved.resolved = true;
        old_resolved.resolved_at = Some(Utc::now() - chrono::Duration::days(40));
        store.save_error(&old_resolved).await.unwrap();

        // Recently resolved — kept.
        let mut new_resolved = record(ErrorCategory::Ai, ErrorSeverity::Medium, "rate limit");
        new_resolved.resolved = true;
        new_resolved.resolved_at = Some(Utc::now() - chrono::Duration::days(2));
        store.save_error(&new_resolved).await.unwrap();

        // Ancient but unresolved — kept regardless of age.
        let mut old_open = record(ErrorCategory::Imap, ErrorSeverity::High, "refused");
        old_open.timestamp = Utc::now() - chrono::Duration::days(400);
        store.save_error(&old_open).await.unwrap();

        let deleted = store.clear_resolved_errors(30).await.unwrap();
        assert_eq!(deleted, 1);

        assert!(store.get_error(&old_resolved.id).await.unwrap().is_none());
        assert!(store.get_error(&new_resolved.id).await.unwrap().is_some());
        assert!(store.get_error(&old_open.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("errors.db");
        let store = LibSqlStore::new_local(&path).await.unwrap();
        store
            .save_error(&record(ErrorCategory::Unknown, ErrorSeverity::Low, "x"))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
