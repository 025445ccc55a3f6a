//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Default store location — a sibling of the main application database.
pub const DEFAULT_DB_PATH: &str = "./data/errors.db";

/// ErrorManager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Capacity of the in-memory recent-error cache.
    pub max_in_memory: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { max_in_memory: 100 }
    }
}

impl ManagerConfig {
    /// Read overrides from `MAILGUARD_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_in_memory: env_parse("MAILGUARD_MAX_IN_MEMORY", defaults.max_in_memory),
        }
    }
}

/// Recovery engine timing configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Base backoff delay.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Larger base for rate-limited AI calls — provider limits need longer
    /// cooldowns than transient socket failures.
    pub rate_limit_base_delay: Duration,
    /// Deadline for a reconnect callback.
    pub reconnect_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_base_delay: Duration::from_secs(5),
            reconnect_timeout: Duration::from_secs(30),
        }
    }
}

/// Store location configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the error database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl StoreConfig {
    /// Read the store path from `MAILGUARD_DB_PATH`, falling back to the
    /// default sibling location.
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("MAILGUARD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH)),
        }
    }
}

/// Retention sweep configuration.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Resolved records older than this are swept.
    pub retention_days: u32,
    /// How often the background sweep runs.
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl RetentionConfig {
    /// Read overrides from `MAILGUARD_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            retention_days: env_parse("MAILGUARD_RETENTION_DAYS", defaults.retention_days),
            sweep_interval: Duration::from_secs(env_parse(
                "MAILGUARD_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval.as_secs(),
            )),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(ManagerConfig::default().max_in_memory, 100);

        let recovery = RecoveryConfig::default();
        assert_eq!(recovery.base_delay, Duration::from_secs(1));
        assert_eq!(recovery.max_delay, Duration::from_secs(60));
        assert!(recovery.rate_limit_base_delay > recovery.base_delay);

        assert_eq!(StoreConfig::default().db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(RetentionConfig::default().retention_days, 30);
    }
}
