//! Durable error persistence — trait, libSQL backend, migrations, retention.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use libsql_backend::LibSqlStore;
pub use traits::{ErrorFilter, ErrorStore, StoreStats};

/// Spawn a background task that periodically sweeps old resolved records.
pub fn spawn_retention_task(
    store: Arc<dyn ErrorStore>,
    retention_days: u32,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = store.clear_resolved_errors(retention_days).await {
                tracing::warn!(error = %e, "Retention sweep failed");
            }
        }
    })
}
