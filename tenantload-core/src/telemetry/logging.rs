//! Logging setup
//!
//! `RUST_LOG` always wins over the configured default level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::telemetry::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Install the global tracing subscriber.
///
/// # Errors
/// Returns [`Error::Configuration`] if a global subscriber is already set.
pub fn try_init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let fmt_layer = match config.format {
        LogFormat::Text => fmt::layer()
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(config.with_target)
            .with_thread_ids(config.with_thread_ids)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| Error::configuration(format!("Failed to install log subscriber: {e}")))
}

/// Install the global tracing subscriber, ignoring a subscriber that is
/// already installed (tests call this repeatedly).
pub fn init_logging(config: &LoggingConfig) {
    if try_init_logging(config).is_err() {
        tracing::debug!("Log subscriber already installed");
    }
}
