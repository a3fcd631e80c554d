//! Tracing initialization
//!
//! `RUST_LOG` wins when set; otherwise the level from the TOML `[logging]`
//! section applies.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used by `init_tracing`
pub fn build_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global tracing subscriber
///
/// Fails if a global subscriber was already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(logging))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Internal(format!("Failed to initialize tracing: {}", e)))
}
