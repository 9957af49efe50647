//! Tracing and logging setup shared by hosts, benches and integration tests.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&logging::LogConfig::from_env());
}

/// Subscriber installation (filters, output format).
pub mod tracing;

/// Logging configuration.
pub mod logging;
