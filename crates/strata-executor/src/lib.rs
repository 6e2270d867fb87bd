//! Idempotent order submission and cancellation.
//!
//! `OrderExecutor` is the single path through which orders reach the
//! exchange. Each submission carries a fresh idempotency token that is
//! reused across retries, so a transient failure can be retried without
//! risking a duplicate order. Every outcome is recorded through the
//! order state tracker, which is the only place other components observe
//! order existence.

pub mod backoff;
pub mod budget;
pub mod error;
pub mod executor;

pub use backoff::ExponentialBackoff;
pub use budget::ActionBudget;
pub use error::{ExecutorError, ExecutorResult};
pub use executor::{ExecutorConfig, OrderExecutor};
