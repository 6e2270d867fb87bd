//! The exchange interface the rest of the system programs against.

use crate::error::ExchangeResult;
use async_trait::async_trait;
use strata_core::{
    AccountSnapshot, ClientOrderId, OrderRequest, OrderStatus, OrderUpdate, Price, Qty, Symbol,
    SymbolFilters,
};

/// Outcome of a successful order placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    /// Exchange-assigned order id.
    pub exchange_id: u64,
    /// Status reported in the acknowledgement (NEW, or FILLED for
    /// aggressive market orders).
    pub status: OrderStatus,
    /// Quantity executed at acknowledgement time.
    pub executed_qty: Qty,
    /// Average price of inline fills, if any executed immediately.
    pub avg_fill_price: Option<Price>,
}

/// Outcome of a successful cancel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelAck {
    pub exchange_id: u64,
    pub status: OrderStatus,
}

/// Async interface to the exchange's REST-equivalent surface.
///
/// Every method returns a typed result whose error distinguishes
/// transient failures (caller may retry with the same token) from
/// definitive rejections (caller must not retry).
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Submit an order carrying the caller's idempotency token.
    ///
    /// Submitting the same token twice must not create a second order on
    /// a conforming exchange; the duplicate is rejected or deduplicated.
    async fn place_order(
        &self,
        token: &ClientOrderId,
        request: &OrderRequest,
    ) -> ExchangeResult<PlacedOrder>;

    /// Cancel an order by exchange id.
    async fn cancel_order(&self, symbol: &Symbol, exchange_id: u64) -> ExchangeResult<CancelAck>;

    /// Fetch the authoritative balance snapshot.
    async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot>;

    /// Fetch constraint filters for a symbol.
    async fn symbol_filters(&self, symbol: &Symbol) -> ExchangeResult<SymbolFilters>;

    /// Fetch currently open orders, optionally scoped to one symbol.
    ///
    /// Returned as normalized `OrderUpdate`s so reconciliation can feed
    /// them through the same path as live events.
    async fn open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>>;

    /// Fetch the current state of a single order by its idempotency
    /// token, whether or not the order is still open.
    async fn query_order(
        &self,
        symbol: &Symbol,
        token: &ClientOrderId,
    ) -> ExchangeResult<OrderUpdate>;

    /// Create a user-data stream listen key.
    async fn create_listen_key(&self) -> ExchangeResult<String>;

    /// Keep an existing listen key alive.
    async fn keepalive_listen_key(&self, listen_key: &str) -> ExchangeResult<()>;
}
