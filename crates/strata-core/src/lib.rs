//! Core domain types for the strata trading engine.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`, `Qty`: precision-safe numeric types
//! - `Symbol`, `SymbolFilters`: trading pair identity and exchange constraints
//! - `OrderSide`, `OrderType`, `OrderStatus`, `ClientOrderId`: order vocabulary
//! - `OrderRequest`, `Order`: submission parameters and tracked order snapshot
//! - `ExchangeEvent`: normalized union of live account-stream events

pub mod decimal;
pub mod error;
pub mod event;
pub mod order;
pub mod symbol;

pub use decimal::{Price, Qty};
pub use error::{CoreError, Result};
pub use event::{AccountSnapshot, Balance, BalanceUpdate, ExchangeEvent, OrderUpdate};
pub use order::{
    ClientOrderId, Order, OrderRequest, OrderSide, OrderStatus, OrderType, RunId, TimeInForce,
};
pub use symbol::{Symbol, SymbolFilters};
