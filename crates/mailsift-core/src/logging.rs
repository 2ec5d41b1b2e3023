//! Logging initialization for the daemon.

use tracing_subscriber::EnvFilter;

/// Initialize the logging system for the daemon.
///
/// Sets up tracing with the level from RUST_LOG if set, otherwise the
/// provided default. Safe to call more than once; later calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
