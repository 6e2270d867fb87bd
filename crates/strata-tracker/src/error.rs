//! Error types for strata-tracker.

use strata_core::ClientOrderId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Order already tracked: {0}")]
    DuplicateOrder(ClientOrderId),

    #[error("Unknown order token: {0}")]
    UnknownOrder(ClientOrderId),
}

pub type TrackerResult<T> = Result<T, TrackerError>;
