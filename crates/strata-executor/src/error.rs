//! Executor error types.

use strata_core::CoreError;
use strata_exchange::ExchangeError;
use strata_tracker::TrackerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid order request: {0}")]
    InvalidRequest(#[from] CoreError),

    #[error("Submission budget exhausted")]
    BudgetExhausted,

    #[error("Order not acknowledged yet, cannot cancel: {0}")]
    NotAcknowledged(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
