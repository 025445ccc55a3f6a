//! Recovery strategy handlers — backoff, timeout-guarded reconnection, and
//! skip/retry semantics, one handler per failure category.
//!
//! Handlers never redo the failed business operation. `Ok(true)` means
//! "proceed: the caller should retry (or, for skip, drop) the original item";
//! `Ok(false)` means the attempt failed. An `Err` is converted by the manager
//! into a failed attempt.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RecoveryConfig;
use crate::error::RecoveryError;
use crate::manager::ErrorManager;
use crate::model::{ErrorCategory, ErrorRecord};
use crate::recovery::backoff::backoff_delay;

/// A per-category recovery handler.
///
/// The record arrives with `recovery_attempts` already incremented by the
/// manager for the attempt in progress.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn attempt(&self, record: &mut ErrorRecord) -> Result<bool, RecoveryError>;
}

/// A connection that can be re-established by the recovery engine.
#[async_trait]
pub trait Reconnect: Send + Sync {
    async fn reconnect(&self) -> Result<(), RecoveryError>;
}

/// Builds and installs the standard per-category handlers.
pub struct RecoveryEngine {
    config: RecoveryConfig,
    imap_reconnect: Option<Arc<dyn Reconnect>>,
    network_reconnect: Option<Arc<dyn Reconnect>>,
}

impl RecoveryEngine {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            config,
            imap_reconnect: None,
            network_reconnect: None,
        }
    }

    /// Callback used to re-establish the IMAP session.
    pub fn with_imap_reconnect(mut self, reconnect: Arc<dyn Reconnect>) -> Self {
        self.imap_reconnect = Some(reconnect);
        self
    }

    /// Callback used to re-establish generic network connections.
    pub fn with_network_reconnect(mut self, reconnect: Arc<dyn Reconnect>) -> Self {
        self.network_reconnect = Some(reconnect);
        self
    }

    /// Register the standard handlers on a manager: imap and network get
    /// reconnect semantics, ai gets rate-limit-aware retry, validation gets
    /// skip.
    pub fn install(&self, manager: &ErrorManager) {
        manager.register_handler(
            ErrorCategory::Imap,
            Arc::new(ReconnectRecovery {
                config: self.config.clone(),
                reconnect: self.imap_reconnect.clone(),
                refuse_on_auth: true,
            }),
        );
        manager.register_handler(
            ErrorCategory::Network,
            Arc::new(ReconnectRecovery {
                config: self.config.clone(),
                reconnect: self.network_reconnect.clone(),
                refuse_on_auth: false,
            }),
        );
        manager.register_handler(
            ErrorCategory::Ai,
            Arc::new(RetryRecovery {
                config: self.config.clone(),
            }),
        );
        manager.register_handler(ErrorCategory::Validation, Arc::new(SkipRecovery));
    }
}

/// Prior completed attempts, for the backoff exponent.
fn prior_attempts(record: &ErrorRecord) -> u32 {
    record.recovery_attempts.saturating_sub(1)
}

/// Reconnect semantics: back off, then re-establish the connection under a
/// deadline. No callback configured means the backoff itself is the recovery.
pub struct ReconnectRecovery {
    config: RecoveryConfig,
    reconnect: Option<Arc<dyn Reconnect>>,
    /// IMAP only: credentials cannot self-heal, so authentication failures
    /// are refused before any backoff is spent.
    refuse_on_auth: bool,
}

#[async_trait]
impl RecoveryHandler for ReconnectRecovery {
    async fn attempt(&self, record: &mut ErrorRecord) -> Result<bool, RecoveryError> {
        if self.refuse_on_auth
            && record
                .exception_message
                .to_ascii_lowercase()
                .contains("authentication")
        {
            warn!(
                error_id = %record.id,
                "Authentication failure is not auto-recoverable"
            );
            return Ok(false);
        }

        let delay = backoff_delay(
            self.config.base_delay,
            self.config.max_delay,
            prior_attempts(record),
        );
        debug!(
            error_id = %record.id,
            attempt = record.recovery_attempts,
            delay_ms = delay.as_millis() as u64,
            "Backing off before reconnect"
        );
        tokio::time::sleep(delay).await;

        let Some(reconnect) = &self.reconnect else {
            // Nothing to re-establish; the cooldown is the whole recovery.
            return Ok(true);
        };

        match tokio::time::timeout(self.config.reconnect_timeout, reconnect.reconnect()).await {
            Ok(Ok(())) => {
                debug!(error_id = %record.id, "Reconnect succeeded");
                Ok(true)
            }
            Ok(Err(e)) => {
                warn!(error_id = %record.id, error = %e, "Reconnect failed");
                Ok(false)
            }
            Err(_) => {
                warn!(
                    error_id = %record.id,
                    timeout_ms = self.config.reconnect_timeout.as_millis() as u64,
                    "Reconnect timed out"
                );
                Ok(false)
            }
        }
    }
}

/// Retry semantics: back off, then signal the caller to try again. Rate-limit
/// messages use the larger base delay.
pub struct RetryRecovery {
    config: RecoveryConfig,
}

#[async_trait]
impl RecoveryHandler for RetryRecovery {
    async fn attempt(&self, record: &mut ErrorRecord) -> Result<bool, RecoveryError> {
        let base = if record
            .exception_message
            .to_ascii_lowercase()
            .contains("rate limit")
        {
            self.config.rate_limit_base_delay
        } else {
            self.config.base_delay
        };

        let delay = backoff_delay(base, self.config.max_delay, prior_attempts(record));
        debug!(
            error_id = %record.id,
            attempt = record.recovery_attempts,
            delay_ms = delay.as_millis() as u64,
            "Backing off before retry"
        );
        tokio::time::sleep(delay).await;
        Ok(true)
    }
}

/// Skip semantics: the original item is permanently skipped, nothing to wait
/// for.
pub struct SkipRecovery;

#[async_trait]
impl RecoveryHandler for SkipRecovery {
    async fn attempt(&self, record: &mut ErrorRecord) -> Result<bool, RecoveryError> {
        debug!(error_id = %record.id, "Skipping failed item");
        Ok(true)
    }
}
