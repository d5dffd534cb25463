//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the directive string from
/// [`LoggingConfig::filter`] is used. Calling this twice is a no-op for the
/// second call (the subscriber can only be installed once per process).
///
/// # Example
/// ```
/// ember_core::init_logging(&ember_core::LoggingConfig::default());
/// tracing::info!("renderer starting");
/// ```
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(config.thread_ids),
        )
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
