//! Authoritative in-memory order state tracking.
//!
//! `OrderStateTracker` is the single writer of order status. Executor
//! acknowledgements and relay events both funnel into one transition
//! function that enforces the lifecycle state machine, keeps executed
//! quantity monotonic, and treats updates to terminal orders as
//! idempotent no-ops (exchange streams may redeliver).

pub mod error;
pub mod tracker;

pub use error::{TrackerError, TrackerResult};
pub use tracker::{OrderDelta, OrderEvent, OrderStateTracker};
