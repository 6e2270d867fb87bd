//! Prometheus metrics and structured logging for strata.
//!
//! - Prometheus metrics for order flow, relay health, and strategy runs
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
