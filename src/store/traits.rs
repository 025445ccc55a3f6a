//! `ErrorStore` trait — the async persistence interface for error records.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{ErrorCategory, ErrorRecord, ErrorSeverity};

/// AND-combined query filters. All optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFilter {
    pub category: Option<ErrorCategory>,
    pub severity: Option<ErrorSeverity>,
    pub resolved: Option<bool>,
}

impl ErrorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total: u64,
    pub by_category: HashMap<ErrorCategory, u64>,
    pub by_severity: HashMap<ErrorSeverity, u64>,
    pub resolved: u64,
    pub unresolved: u64,
    pub recovery_attempted: u64,
    pub recovery_successful: u64,
}

/// Durable, indexed persistence for error records.
#[async_trait]
pub trait ErrorStore: Send + Sync {
    /// Idempotent upsert keyed by `record.id`; last write wins. Used for both
    /// creation and every mutation.
    async fn save_error(&self, record: &ErrorRecord) -> Result<(), StoreError>;

    /// Fetch a record by exact ID.
    async fn get_error(&self, id: &str) -> Result<Option<ErrorRecord>, StoreError>;

    /// Fetch the newest record whose ID starts with `prefix`. Exact matches
    /// win over prefix matches.
    async fn get_error_by_prefix(&self, prefix: &str) -> Result<Option<ErrorRecord>, StoreError>;

    /// Most recent records first, up to `limit`, AND-filtered.
    async fn get_recent_errors(
        &self,
        limit: usize,
        filter: &ErrorFilter,
    ) -> Result<Vec<ErrorRecord>, StoreError>;

    /// Count records matching the filter.
    async fn get_error_count(&self, filter: &ErrorFilter) -> Result<u64, StoreError>;

    /// Aggregate stats over all records.
    async fn get_error_stats(&self) -> Result<StoreStats, StoreError>;

    /// Delete resolved records whose `resolved_at` is older than the cutoff.
    /// Unresolved records are never deleted regardless of age. Returns the
    /// number of rows removed.
    async fn clear_resolved_errors(&self, older_than_days: u32) -> Result<u64, StoreError>;
}
