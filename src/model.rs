//! Error record model — categories, severities, recovery strategies, and the
//! record entity itself.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ErrorContext;

/// Default per-record recovery attempt budget.
pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: u32 = 3;

/// Which subsystem a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// IMAP fetch / mailbox session.
    Imap,
    /// LLM provider calls.
    Ai,
    /// Input validation.
    Validation,
    /// Local filesystem access.
    Filesystem,
    /// Persistence layer.
    Database,
    /// Generic network I/O.
    Network,
    /// Configuration loading/parsing.
    Configuration,
    /// Content parsing.
    Parsing,
    /// Calendar/task/third-party integrations.
    Integration,
    /// Anything unclassified.
    Unknown,
}

impl ErrorCategory {
    /// Number of categories — sizes the recovery dispatch table.
    pub const COUNT: usize = 10;

    /// All categories, in dispatch-table order.
    pub const ALL: [ErrorCategory; Self::COUNT] = [
        Self::Imap,
        Self::Ai,
        Self::Validation,
        Self::Filesystem,
        Self::Database,
        Self::Network,
        Self::Configuration,
        Self::Parsing,
        Self::Integration,
        Self::Unknown,
    ];

    /// Stable string form (matches the persisted column values).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::Ai => "ai",
            Self::Validation => "validation",
            Self::Filesystem => "filesystem",
            Self::Database => "database",
            Self::Network => "network",
            Self::Configuration => "configuration",
            Self::Parsing => "parsing",
            Self::Integration => "integration",
            Self::Unknown => "unknown",
        }
    }

    /// Index into the recovery handler dispatch table.
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "imap" => Ok(Self::Imap),
            "ai" => Ok(Self::Ai),
            "validation" => Ok(Self::Validation),
            "filesystem" => Ok(Self::Filesystem),
            "database" => Ok(Self::Database),
            "network" => Ok(Self::Network),
            "configuration" => Ok(Self::Configuration),
            "parsing" => Ok(Self::Parsing),
            "integration" => Ok(Self::Integration),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Unknown error category: {}", s)),
        }
    }
}

/// How urgent a failure is, independent of whether it can heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorSeverity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// The declared healing approach for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Back off, then signal the caller to retry the operation.
    Retry,
    /// Back off, re-establish the connection, then signal retry.
    Reconnect,
    /// Treat the original item as permanently skipped.
    Skip,
    /// Degrade to an alternative path.
    Fallback,
    /// Needs a human.
    Manual,
    /// Nothing to do.
    None,
}

impl RecoveryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Reconnect => "reconnect",
            Self::Skip => "skip",
            Self::Fallback => "fallback",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }

    /// Whether the automatic recovery engine will ever act on this strategy.
    pub fn is_automatic(&self) -> bool {
        !matches!(self, Self::Manual | Self::None)
    }
}

impl std::fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecoveryStrategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry" => Ok(Self::Retry),
            "reconnect" => Ok(Self::Reconnect),
            "skip" => Ok(Self::Skip),
            "fallback" => Ok(Self::Fallback),
            "manual" => Ok(Self::Manual),
            "none" => Ok(Self::None),
            _ => Err(format!("Unknown recovery strategy: {}", s)),
        }
    }
}

// Process-wide sequence appended to IDs. Two records created in the same
// millisecond on concurrent tasks would otherwise collide.
static ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Build a record ID from the category, the creation timestamp, and a
/// monotonic sequence suffix.
pub(crate) fn generate_error_id(category: ErrorCategory, at: DateTime<Utc>) -> String {
    let seq = ID_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{}", category.as_str(), at.timestamp_millis(), seq)
}

/// One recorded failure occurrence.
///
/// The identity and diagnostic fields are frozen at creation; only the
/// recovery/resolution fields mutate afterwards, and only through
/// `ErrorManager::attempt_recovery` or `ErrorManager::mark_resolved`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unique ID: `category_millis_seq`.
    pub id: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Originating subsystem.
    pub category: ErrorCategory,
    /// Urgency ranking.
    pub severity: ErrorSeverity,
    /// Source error type name.
    pub exception_type: String,
    /// Source error message.
    pub exception_message: String,
    /// Error chain / backtrace text, if captured.
    #[serde(default)]
    pub traceback: String,
    /// Component that failed (e.g. "email_poller").
    pub component: String,
    /// Operation that failed (e.g. "fetch_unseen").
    pub operation: String,
    /// Sanitized diagnostic context.
    #[serde(default)]
    pub context: ErrorContext,
    /// Declared healing approach.
    pub recovery_strategy: RecoveryStrategy,
    /// Whether recovery was ever attempted.
    #[serde(default)]
    pub recovery_attempted: bool,
    /// Outcome of the most recent attempt, if any.
    #[serde(default)]
    pub recovery_successful: Option<bool>,
    /// Attempts consumed so far.
    #[serde(default)]
    pub recovery_attempts: u32,
    /// Attempt budget for this record.
    pub max_recovery_attempts: u32,
    /// Whether the failure is considered dealt with.
    #[serde(default)]
    pub resolved: bool,
    /// When it was resolved.
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Free-form resolution notes.
    #[serde(default)]
    pub notes: String,
}

impl ErrorRecord {
    /// Whether automatic recovery may still be attempted.
    ///
    /// False once the attempt budget is spent, the record is resolved, or the
    /// strategy is manual/none.
    pub fn can_recover(&self) -> bool {
        self.recovery_attempts < self.max_recovery_attempts
            && !self.resolved
            && self.recovery_strategy.is_automatic()
    }

    /// Mark the record resolved by hand (outside the recovery engine).
    pub fn mark_resolved(&mut self, notes: impl Into<String>) {
        self.resolved = true;
        self.resolved_at = Some(Utc::now());
        self.notes = notes.into();
    }
}
