//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn json_output() -> bool {
    std::env::var("RUST_ENV").is_ok_and(|v| v == "production")
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` controls the filter, defaulting to info with debug for
/// this workspace's crates. `RUST_ENV=production` switches the format
/// from human-readable pretty output to JSON lines.
pub fn init_logging() -> TelemetryResult<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));
    let base = tracing_subscriber::registry().with(filter);

    let result = if json_output() {
        base.with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init()
    } else {
        base.with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
