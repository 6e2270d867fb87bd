//! Raw user-data payload normalization.
//!
//! Everything the stream delivers is decoded here, at the boundary, into
//! the closed `ExchangeEvent` union. Unrecognized event types become
//! `ExchangeEvent::Unknown`; structurally broken payloads are errors the
//! relay counts and drops without touching the connection.

use rust_decimal::Decimal;
use serde::Deserialize;
use strata_core::{
    Balance, BalanceUpdate, ClientOrderId, ExchangeEvent, OrderType, OrderUpdate, Price, Qty,
    Symbol,
};

use crate::error::{RelayError, RelayResult};

/// Raw execution report event.
#[derive(Debug, Deserialize)]
pub struct RawExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    /// Original client order id; set on cancels, where `c` carries the
    /// cancel request's own id.
    #[serde(rename = "C", default)]
    pub orig_client_order_id: Option<String>,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "q")]
    pub qty: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "z")]
    pub cum_filled_qty: Decimal,
    #[serde(rename = "L")]
    pub last_fill_price: Decimal,
    #[serde(rename = "Z")]
    pub cum_quote_qty: Decimal,
}

/// Raw account position event.
#[derive(Debug, Deserialize)]
pub struct RawAccountPosition {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "B")]
    pub balances: Vec<RawBalance>,
}

#[derive(Debug, Deserialize)]
pub struct RawBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: Decimal,
    #[serde(rename = "l")]
    pub locked: Decimal,
}

fn parse_order_type(raw: &str) -> RelayResult<OrderType> {
    match raw {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        "STOP_MARKET" | "STOP_LOSS" => Ok(OrderType::StopMarket),
        other => Err(RelayError::Parse(format!("unsupported order type {other}"))),
    }
}

impl RawExecutionReport {
    fn normalize(self) -> RelayResult<OrderUpdate> {
        let status = self
            .status
            .parse()
            .map_err(|_| RelayError::Parse(format!("order status {}", self.status)))?;
        let side = self
            .side
            .parse()
            .map_err(|_| RelayError::Parse(format!("order side {}", self.side)))?;
        let order_type = parse_order_type(&self.order_type)?;

        // Cancels report the cancel's own id in `c` and the submitting
        // token in `C`; the tracker keys on the submitting token.
        let token = match self.orig_client_order_id {
            Some(orig) if !orig.is_empty() && orig != "null" => orig,
            _ => self.client_order_id,
        };

        let last_fill_price = if self.last_fill_price.is_zero() {
            None
        } else {
            Some(Price::new(self.last_fill_price))
        };

        Ok(OrderUpdate {
            token: ClientOrderId::from_string(token),
            exchange_id: self.order_id,
            symbol: Symbol::new(self.symbol),
            side,
            order_type,
            status,
            qty: Qty::new(self.qty),
            price: Price::new(self.price),
            executed_qty: Qty::new(self.cum_filled_qty),
            last_fill_price,
            cumulative_quote: Some(self.cum_quote_qty),
            event_time: self.event_time,
        })
    }
}

impl RawAccountPosition {
    fn normalize(self) -> BalanceUpdate {
        let balances: Vec<Balance> = self
            .balances
            .into_iter()
            .map(|raw| Balance {
                asset: raw.asset,
                free: raw.free,
                locked: raw.locked,
            })
            .filter(Balance::is_nonzero)
            .collect();
        BalanceUpdate {
            balances,
            event_time: self.event_time,
        }
    }
}

/// Parse one raw stream payload into a normalized event.
///
/// Unrecognized event types are `Ok(Unknown)`: the stream adds event
/// kinds over time and they must not be treated as transport failures.
/// An `Err` means the payload claimed a known type but could not be
/// decoded.
pub fn parse_event(text: &str) -> RelayResult<ExchangeEvent> {
    let raw: serde_json::Value = serde_json::from_str(text)?;

    let Some(event_type) = raw.get("e").and_then(|v| v.as_str()) else {
        return Ok(ExchangeEvent::Unknown);
    };

    match event_type {
        "executionReport" => {
            let report: RawExecutionReport = serde_json::from_value(raw)?;
            Ok(ExchangeEvent::OrderUpdate(report.normalize()?))
        }
        "outboundAccountPosition" => {
            let position: RawAccountPosition = serde_json::from_value(raw)?;
            Ok(ExchangeEvent::BalanceUpdate(position.normalize()))
        }
        _ => Ok(ExchangeEvent::Unknown),
    }
}
