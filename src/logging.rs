//! Logging setup and span constructors
//!
//! Lambda forwards stdout to CloudWatch, so production runs log JSON lines
//! and local runs log pretty-printed text.

use clap::ValueEnum;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// JSON structured logs (for CloudWatch).
    #[default]
    Json,
    /// Pretty-printed logs (for local runs).
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. `RUST_LOG`
/// controls levels (default `info`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        // try_init: a subscriber may already be installed by a test harness
        let _ = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(true))
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };
    });
}

/// Span covering the handling of one lifecycle event.
#[must_use]
pub fn invocation_span(
    request_id: &str,
    request_type: &str,
    resource_type: &str,
    logical_resource_id: &str,
) -> Span {
    tracing::info_span!(
        "invocation",
        request_id = request_id,
        request_type = request_type,
        resource_type = resource_type,
        logical_resource_id = logical_resource_id,
    )
}
