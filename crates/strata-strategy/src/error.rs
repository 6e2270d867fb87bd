//! Strategy error types.

use strata_core::RunId;
use strata_exchange::ExchangeError;
use strata_executor::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Invalid strategy parameters: {0}")]
    InvalidParams(String),

    #[error("Unknown run: {0}")]
    UnknownRun(RunId),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

pub type StrategyResult<T> = Result<T, StrategyError>;
