//! Normalized live account-stream events.
//!
//! The relay decodes raw exchange payloads into this closed union at its
//! boundary; malformed or unrecognized payloads become `Unknown` instead of
//! propagating loosely-typed values downstream.

use crate::{ClientOrderId, OrderSide, OrderStatus, OrderType, Price, Qty, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalized order execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Client order id attached at submission.
    pub token: ClientOrderId,
    /// Exchange-assigned order id.
    pub exchange_id: u64,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    /// Requested quantity.
    pub qty: Qty,
    /// Order price (zero for market orders).
    pub price: Price,
    /// Cumulative executed quantity.
    pub executed_qty: Qty,
    /// Price of the last execution, if any.
    pub last_fill_price: Option<Price>,
    /// Cumulative quote asset transacted; `cumulative_quote / executed_qty`
    /// is the exact average fill price.
    pub cumulative_quote: Option<Decimal>,
    /// Event timestamp (Unix milliseconds).
    pub event_time: i64,
}

impl OrderUpdate {
    /// Quantity-weighted average fill price, when anything has executed.
    pub fn avg_fill_price(&self) -> Option<Price> {
        let quote = self.cumulative_quote?;
        if self.executed_qty.is_zero() {
            return None;
        }
        Some(Price::new(quote / self.executed_qty.inner()))
    }
}

/// One asset balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    /// True if the balance holds anything at all.
    pub fn is_nonzero(&self) -> bool {
        !self.free.is_zero() || !self.locked.is_zero()
    }
}

/// Normalized account balance update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    /// Non-zero balances only.
    pub balances: Vec<Balance>,
    /// Event timestamp (Unix milliseconds).
    pub event_time: i64,
}

/// Normalized union of live account-stream events.
///
/// Immutable once constructed; delivered as broadcast fan-out, so any
/// number of subscribers may observe each event and slow subscribers may
/// miss some.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExchangeEvent {
    OrderUpdate(OrderUpdate),
    BalanceUpdate(BalanceUpdate),
    /// Payload the relay could not decode; carried for diagnostics only.
    Unknown,
}

/// Point-in-time account state fetched by direct query.
///
/// Used for reconciliation after a relay reconnect: the snapshot is
/// authoritative and is replayed through the order state tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Non-zero balances.
    pub balances: Vec<Balance>,
    /// Snapshot timestamp (Unix milliseconds).
    pub fetched_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_nonzero() {
        let b = Balance {
            asset: "BTC".into(),
            free: dec!(0),
            locked: dec!(0),
        };
        assert!(!b.is_nonzero());

        let b = Balance {
            asset: "BTC".into(),
            free: dec!(0),
            locked: dec!(0.5),
        };
        assert!(b.is_nonzero());
    }

    #[test]
    fn test_event_serde_tagging() {
        let event = ExchangeEvent::BalanceUpdate(BalanceUpdate {
            balances: vec![Balance {
                asset: "USDT".into(),
                free: dec!(1000),
                locked: dec!(0),
            }],
            event_time: 1700000000000,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"balance_update\""));
        let back: ExchangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
