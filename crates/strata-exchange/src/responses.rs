//! Raw REST response shapes.
//!
//! These mirror the exchange's JSON payloads field-for-field; conversion
//! into core domain types happens in `rest.rs`.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Error body returned with non-2xx status codes.
#[derive(Debug, Deserialize)]
pub struct RawApiError {
    pub code: i64,
    pub msg: String,
}

/// One fill reported inline with an order acknowledgement.
#[derive(Debug, Deserialize)]
pub struct RawFill {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Acknowledgement for a placed order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrderAck {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    #[serde(default)]
    pub transact_time: i64,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub status: String,
    #[serde(default)]
    pub fills: Vec<RawFill>,
}

impl RawOrderAck {
    /// Quantity-weighted average price across inline fills, if any.
    pub fn avg_fill_price(&self) -> Option<Decimal> {
        let total_qty: Decimal = self.fills.iter().map(|f| f.qty).sum();
        if total_qty.is_zero() {
            return None;
        }
        let total_quote: Decimal = self.fills.iter().map(|f| f.price * f.qty).sum();
        Some(total_quote / total_qty)
    }
}

/// Acknowledgement for a cancelled order.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCancelAck {
    pub symbol: String,
    pub order_id: u64,
    pub status: String,
}

/// One balance row in the account response.
#[derive(Debug, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Account information response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAccount {
    #[serde(default)]
    pub can_trade: bool,
    pub balances: Vec<RawBalance>,
}

/// One symbol constraint filter. Unrecognized filter types are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
pub enum RawFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { min_qty: Decimal, step_size: Decimal },
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter { tick_size: Decimal },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },
    #[serde(other)]
    Other,
}

/// Per-symbol section of the exchange info response.
#[derive(Debug, Deserialize)]
pub struct RawSymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub filters: Vec<RawFilter>,
}

/// Exchange info response.
#[derive(Debug, Deserialize)]
pub struct RawExchangeInfo {
    pub symbols: Vec<RawSymbolInfo>,
}

/// One open order row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOpenOrder {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(default)]
    pub update_time: i64,
}

/// Listen-key creation response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListenKey {
    pub listen_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_ack_parse() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "orderId": 12345,
            "clientOrderId": "strata_1_abc",
            "transactTime": 1700000000000,
            "price": "0.0",
            "origQty": "0.001",
            "executedQty": "0.001",
            "status": "FILLED",
            "fills": [
                {"price": "50000.0", "qty": "0.0005"},
                {"price": "50010.0", "qty": "0.0005"}
            ]
        }"#;
        let ack: RawOrderAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.order_id, 12345);
        assert_eq!(ack.status, "FILLED");
        assert_eq!(ack.avg_fill_price(), Some(dec!(50005.0)));
    }

    #[test]
    fn test_order_ack_no_fills() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "orderId": 1,
            "clientOrderId": "c",
            "origQty": "1",
            "executedQty": "0",
            "status": "NEW"
        }"#;
        let ack: RawOrderAck = serde_json::from_str(json).unwrap();
        assert!(ack.avg_fill_price().is_none());
    }

    #[test]
    fn test_filter_parse_skips_unknown() {
        let json = r#"{
            "symbols": [{
                "symbol": "BTCUSDT",
                "filters": [
                    {"filterType": "LOT_SIZE", "minQty": "0.00001", "stepSize": "0.00001", "maxQty": "9000"},
                    {"filterType": "PRICE_FILTER", "tickSize": "0.01"},
                    {"filterType": "ICEBERG_PARTS"},
                    {"filterType": "NOTIONAL", "minNotional": "5.0"}
                ]
            }]
        }"#;
        let info: RawExchangeInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.symbols.len(), 1);
        assert_eq!(info.symbols[0].filters.len(), 4);
        assert!(matches!(info.symbols[0].filters[2], RawFilter::Other));
    }

    #[test]
    fn test_api_error_parse() {
        let err: RawApiError =
            serde_json::from_str(r#"{"code": -2010, "msg": "Account has insufficient balance"}"#)
                .unwrap();
        assert_eq!(err.code, -2010);
    }
}
