//! Automatic recovery — backoff math and per-category strategy handlers.

pub mod backoff;
pub mod engine;

pub use backoff::backoff_delay;
pub use engine::{Reconnect, RecoveryEngine, RecoveryHandler};
