//! Deterministic error classification — maps what happened to how bad it is
//! and how to heal it.
//!
//! Pure functions, no I/O. The manager consults these only for values the
//! caller did not set explicitly.

use serde::{Deserialize, Serialize};

use crate::model::{ErrorCategory, ErrorSeverity, RecoveryStrategy};

/// Coarse shape of the underlying failure, independent of category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    /// Allocation failure / memory exhaustion.
    OutOfMemory,
    /// Interrupt signal received.
    Interrupt,
    /// Unrecoverable exit condition.
    FatalExit,
    /// Connection refused/reset/dropped.
    ConnectionError,
    /// Deadline exceeded.
    Timeout,
    /// Permission or authentication denied.
    PermissionDenied,
    /// Bad input value.
    ValueError,
    /// Everything else.
    Other,
}

impl ExceptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfMemory => "out_of_memory",
            Self::Interrupt => "interrupt",
            Self::FatalExit => "fatal_exit",
            Self::ConnectionError => "connection_error",
            Self::Timeout => "timeout",
            Self::PermissionDenied => "permission_denied",
            Self::ValueError => "value_error",
            Self::Other => "other",
        }
    }

    /// Kinds that end the process's useful life.
    fn is_fatal(&self) -> bool {
        matches!(self, Self::OutOfMemory | Self::Interrupt | Self::FatalExit)
    }

    /// Kinds that usually pass on their own.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError | Self::Timeout | Self::PermissionDenied
        )
    }
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure into `(severity, strategy)`.
pub fn classify(
    kind: ExceptionKind,
    category: ErrorCategory,
    message: &str,
) -> (ErrorSeverity, RecoveryStrategy) {
    (
        severity_for(kind, category, message),
        strategy_for(kind, category, message),
    )
}

/// Severity heuristics. Ordered, first match wins.
pub fn severity_for(kind: ExceptionKind, category: ErrorCategory, message: &str) -> ErrorSeverity {
    if kind.is_fatal() {
        return ErrorSeverity::Critical;
    }
    if kind.is_transient() {
        return ErrorSeverity::High;
    }
    let message = message.to_ascii_lowercase();
    match category {
        // Failed mailbox auth locks out the whole pipeline.
        ErrorCategory::Imap if message.contains("authentication") => ErrorSeverity::Critical,
        ErrorCategory::Imap => ErrorSeverity::High,
        // Rate limits clear themselves; other provider failures do not.
        ErrorCategory::Ai if message.contains("rate limit") => ErrorSeverity::Medium,
        ErrorCategory::Ai => ErrorSeverity::High,
        _ => ErrorSeverity::Medium,
    }
}

/// Strategy heuristics. Ordered, first match wins.
pub fn strategy_for(
    kind: ExceptionKind,
    category: ErrorCategory,
    message: &str,
) -> RecoveryStrategy {
    if matches!(kind, ExceptionKind::ConnectionError | ExceptionKind::Timeout) {
        return RecoveryStrategy::Reconnect;
    }
    if message.to_ascii_lowercase().contains("rate limit") {
        return RecoveryStrategy::Retry;
    }
    match category {
        ErrorCategory::Imap => RecoveryStrategy::Reconnect,
        ErrorCategory::Ai => RecoveryStrategy::Retry,
        ErrorCategory::Validation => RecoveryStrategy::Skip,
        _ => RecoveryStrategy::Manual,
    }
}
