//! Logging utilities
//!
//! Logging initialization for hosts embedding the kernel:
//! - Respects the RUST_LOG environment variable
//! - Allows configuration via config file
//! - Never panics when a global subscriber is already installed
//!
//! # Usage
//!
//! ```rust
//! use modhost::utils::init_logging;
//!
//! init_logging(None); // Uses RUST_LOG or defaults to "info"
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Pick the effective filter: RUST_LOG, then the config filter, then "info"
fn env_filter(filter: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(filter.unwrap_or("info"))
}

/// Initialize human-readable logging
///
/// # Arguments
/// * `filter` - Optional log filter from config (e.g. "info",
///   "modhost::module=debug,modhost::services=trace"). RUST_LOG takes
///   precedence.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging with JSON output
///
/// Useful when logs need to be parsed by log aggregation systems.
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) -> bool {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter(filter))
        .try_init()
        .is_ok()
}

/// Initialize logging from [`LoggingConfig`](crate::config::LoggingConfig)
///
/// Falls back to human-readable output when JSON is requested but the
/// `json-logging` feature is disabled.
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) -> bool {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            return init_json_logging(filter);
        }
    }
    init_logging(filter)
}
