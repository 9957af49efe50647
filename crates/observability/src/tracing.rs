//! Tracing subscriber initialization.
//!
//! Output goes to stdout in the configured format; filtering follows `RUST_LOG`.

use tracing_subscriber::EnvFilter;

use crate::logging::{LogConfig, LogFormat};

/// Install the global subscriber.
///
/// Returns `false` if one was already installed (the call is then a no-op).
pub fn init(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Compact => builder.compact().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(format = ?config.format, "logging initialized");
    }
    installed
}
