//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] strata_exchange::ExchangeError),

    #[error("Relay error: {0}")]
    Relay(#[from] strata_relay::RelayError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strata_strategy::StrategyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] strata_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
