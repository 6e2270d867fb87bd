//! Persistent user-data stream relay.
//!
//! Maintains one websocket session against the exchange's user-data
//! stream, normalizes raw payloads into `ExchangeEvent`s at the decode
//! boundary, and fans them out over a broadcast channel. The session is
//! supervised: heartbeat loss or transport errors tear down the socket
//! and the relay reconnects with exponential backoff, replaying a
//! reconciliation snapshot through the same event channel so subscribers
//! never see a gap they cannot recover from.

pub mod error;
pub mod parser;
pub mod relay;

pub use error::{RelayError, RelayResult};
pub use relay::{ConnectionState, ExchangeEventRelay, RelayConfig};
