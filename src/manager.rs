//! Error manager — the façade over classification, caching, persistence, and
//! recovery orchestration.
//!
//! Constructed once at startup and shared via `Arc`. The in-memory cache,
//! per-category counters, and handler dispatch table live behind a single
//! mutex; the lock is never held across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::classify::{ExceptionKind, severity_for, strategy_for};
use crate::config::ManagerConfig;
use crate::context::ErrorContext;
use crate::model::{
    DEFAULT_MAX_RECOVERY_ATTEMPTS, ErrorCategory, ErrorRecord, ErrorSeverity, RecoveryStrategy,
    generate_error_id,
};
use crate::recovery::RecoveryHandler;
use crate::store::ErrorStore;

/// A failure being reported to the manager.
///
/// Severity and strategy are optional; the classifier fills whichever the
/// call site leaves unset.
#[derive(Debug)]
pub struct Failure {
    pub category: ErrorCategory,
    pub component: String,
    pub operation: String,
    pub kind: ExceptionKind,
    pub exception_type: Option<String>,
    pub message: String,
    pub traceback: String,
    pub severity: Option<ErrorSeverity>,
    pub strategy: Option<RecoveryStrategy>,
    pub context: ErrorContext,
    pub max_attempts: u32,
}

impl Failure {
    pub fn new(
        category: ErrorCategory,
        component: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            component: component.into(),
            operation: operation.into(),
            kind: ExceptionKind::Other,
            exception_type: None,
            message: message.into(),
            traceback: String::new(),
            severity: None,
            strategy: None,
            context: ErrorContext::new(),
            max_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
        }
    }

    /// Capture a `std::error::Error` — message, concrete type name, and the
    /// source chain as the traceback text.
    pub fn from_error<E>(
        category: ErrorCategory,
        component: impl Into<String>,
        operation: impl Into<String>,
        error: &E,
    ) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut traceback = String::new();
        let mut source = error.source();
        while let Some(cause) = source {
            traceback.push_str("caused by: ");
            traceback.push_str(&cause.to_string());
            traceback.push('\n');
            source = cause.source();
        }
        Self::new(category, component, operation, error.to_string())
            .exception_type(std::any::type_name_of_val(error))
            .traceback(traceback)
    }

    pub fn kind(mut self, kind: ExceptionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    pub fn traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = traceback.into();
        self
    }

    /// Explicit severity; skips the classifier for this axis.
    pub fn severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Explicit strategy; skips the classifier for this axis.
    pub fn strategy(mut self, strategy: RecoveryStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Running counters over everything recorded since startup (or the last
/// reset).
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total: u64,
    pub by_category: HashMap<ErrorCategory, u64>,
}

struct ManagerInner {
    recent: VecDeque<ErrorRecord>,
    counts: HashMap<ErrorCategory, u64>,
    total: u64,
    handlers: [Option<Arc<dyn RecoveryHandler>>; ErrorCategory::COUNT],
}

/// The error subsystem façade.
pub struct ErrorManager {
    config: ManagerConfig,
    store: Option<Arc<dyn ErrorStore>>,
    inner: Mutex<ManagerInner>,
}

impl ErrorManager {
    /// A manager with no persistence — records live only in the cache.
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            config,
            store: None,
            inner: Mutex::new(ManagerInner {
                recent: VecDeque::new(),
                counts: HashMap::new(),
                total: 0,
                handlers: std::array::from_fn(|_| None),
            }),
        }
    }

    /// A manager that also persists every record and mutation.
    pub fn with_store(config: ManagerConfig, store: Arc<dyn ErrorStore>) -> Self {
        let mut manager = Self::new(config);
        manager.store = Some(store);
        manager
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, ManagerInner> {
        self.inner.lock().expect("ErrorManager mutex poisoned")
    }

    /// Record a failure: classify, build the record, cache it, bump counters,
    /// persist. Never fails the caller — persistence errors are logged and
    /// dropped.
    pub async fn record(&self, failure: Failure) -> ErrorRecord {
        let severity = failure
            .severity
            .unwrap_or_else(|| severity_for(failure.kind, failure.category, &failure.message));
        let strategy = failure
            .strategy
            .unwrap_or_else(|| strategy_for(failure.kind, failure.category, &failure.message));

        let now = Utc::now();
        let record = ErrorRecord {
            id: generate_error_id(failure.category, now),
            timestamp: now,
            category: failure.category,
            severity,
            exception_type: failure
                .exception_type
                .unwrap_or_else(|| failure.kind.as_str().to_string()),
            exception_message: failure.message,
            traceback: failure.traceback,
            component: failure.component,
            operation: failure.operation,
            context: failure.context,
            recovery_strategy: strategy,
            recovery_attempted: false,
            recovery_successful: None,
            recovery_attempts: 0,
            max_recovery_attempts: failure.max_attempts,
            resolved: false,
            resolved_at: None,
            notes: String::new(),
        };

        {
            let mut inner = self.inner();
            inner.recent.push_back(record.clone());
            while inner.recent.len() > self.config.max_in_memory {
                inner.recent.pop_front();
            }
            *inner.counts.entry(record.category).or_insert(0) += 1;
            inner.total += 1;
        }

        match record.severity {
            ErrorSeverity::Critical | ErrorSeverity::High => tracing::error!(
                error_id = %record.id,
                category = %record.category,
                severity = %record.severity,
                component = %record.component,
                operation = %record.operation,
                message = %record.exception_message,
                "Error recorded"
            ),
            ErrorSeverity::Medium => warn!(
                error_id = %record.id,
                category = %record.category,
                component = %record.component,
                operation = %record.operation,
                message = %record.exception_message,
                "Error recorded"
            ),
            ErrorSeverity::Low => info!(
                error_id = %record.id,
                category = %record.category,
                message = %record.exception_message,
                "Error recorded"
            ),
        }

        self.persist(&record).await;
        record
    }

    /// Whether automatic recovery may still be attempted for this record.
    pub fn can_recover(&self, record: &ErrorRecord) -> bool {
        record.can_recover()
    }

    /// Drive one recovery attempt.
    ///
    /// Returns false without consuming budget when the record cannot recover.
    /// Otherwise one attempt is consumed no matter how the handler fares: a
    /// missing handler, a handler returning `Ok(false)`, and a handler
    /// returning `Err` all count as a failed attempt. Success resolves the
    /// record. The caller owns the record's recovery sequence via the `&mut`
    /// borrow; attempts are strictly sequential.
    pub async fn attempt_recovery(&self, record: &mut ErrorRecord) -> bool {
        if !record.can_recover() {
            debug!(error_id = %record.id, "Recovery not applicable");
            return false;
        }

        record.recovery_attempted = true;
        record.recovery_attempts += 1;

        let handler = self.inner().handlers[record.category.index()].clone();

        let success = match handler {
            None => {
                warn!(
                    error_id = %record.id,
                    category = %record.category,
                    "No recovery handler registered"
                );
                false
            }
            Some(handler) => match handler.attempt(record).await {
                Ok(success) => success,
                // The one-shot swallow: a handler error is a failed attempt,
                // never propagated to the caller.
                Err(e) => {
                    warn!(
                        error_id = %record.id,
                        category = %record.category,
                        error = %e,
                        "Recovery handler failed"
                    );
                    false
                }
            },
        };

        record.recovery_successful = Some(success);
        if success {
            record.resolved = true;
            record.resolved_at = Some(Utc::now());
            info!(
                error_id = %record.id,
                attempts = record.recovery_attempts,
                "Recovery succeeded"
            );
        } else {
            warn!(
                error_id = %record.id,
                attempts = record.recovery_attempts,
                max_attempts = record.max_recovery_attempts,
                "Recovery attempt failed"
            );
        }

        self.refresh_cached(record);
        self.persist(record).await;
        success
    }

    /// Resolve a record by hand, outside the recovery engine.
    pub async fn mark_resolved(&self, record: &mut ErrorRecord, notes: impl Into<String>) {
        record.mark_resolved(notes);
        info!(error_id = %record.id, "Error marked resolved");
        self.refresh_cached(record);
        self.persist(record).await;
    }

    /// Register (or replace) the handler for a category. Last registration
    /// wins. No handlers are pre-registered; `RecoveryEngine::install` sets
    /// up the standard set.
    pub fn register_handler(&self, category: ErrorCategory, handler: Arc<dyn RecoveryHandler>) {
        self.inner().handlers[category.index()] = Some(handler);
        debug!(category = %category, "Recovery handler registered");
    }

    /// Counters since startup or the last `reset_stats`.
    pub fn stats(&self) -> ErrorStats {
        let inner = self.inner();
        ErrorStats {
            total: inner.total,
            by_category: inner.counts.clone(),
        }
    }

    /// Newest-first slice of the in-memory cache. Does not query the store.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let inner = self.inner();
        inner.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Number of records currently cached.
    pub fn cached_len(&self) -> usize {
        self.inner().recent.len()
    }

    /// Clear counters and the cache. The store is untouched.
    pub fn reset_stats(&self) {
        let mut inner = self.inner();
        inner.recent.clear();
        inner.counts.clear();
        inner.total = 0;
        info!("Error stats reset");
    }

    /// Overwrite the cached copy of a mutated record, if still cached.
    fn refresh_cached(&self, record: &ErrorRecord) {
        let mut inner = self.inner();
        if let Some(cached) = inner.recent.iter_mut().find(|r| r.id == record.id) {
            *cached = record.clone();
        }
    }

    async fn persist(&self, record: &ErrorRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_error(record).await {
                warn!(error_id = %record.id, error = %e, "Failed to persist error record");
            }
        }
    }
}
