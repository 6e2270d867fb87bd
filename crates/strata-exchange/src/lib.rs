//! Exchange collaborator boundary.
//!
//! Defines the [`ExchangeApi`] trait the rest of the system programs
//! against, plus a REST implementation with HMAC-SHA256 request signing.
//! The exchange owns constraint/precision rules; this crate fetches them
//! as data (`SymbolFilters`) rather than hard-coding them.

pub mod api;
pub mod credentials;
pub mod error;
pub mod rest;
pub mod responses;
pub mod signer;

pub use api::{CancelAck, ExchangeApi, PlacedOrder};
pub use credentials::ApiCredentials;
pub use error::{ExchangeError, ExchangeResult};
pub use rest::{RestClient, RestConfig};
pub use signer::RequestSigner;
