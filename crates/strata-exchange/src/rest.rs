//! REST implementation of the exchange interface.
//!
//! Maps HTTP status codes onto the transient/definitive error taxonomy:
//! 429/418 → rate limited, 5xx → server error (both transient), other
//! non-2xx → definitive rejection carrying the exchange's error code.

use crate::api::{CancelAck, ExchangeApi, PlacedOrder};
use crate::credentials::ApiCredentials;
use crate::error::{ExchangeError, ExchangeResult};
use crate::responses::{
    RawAccount, RawApiError, RawCancelAck, RawExchangeInfo, RawFilter, RawListenKey, RawOpenOrder,
    RawOrderAck,
};
use crate::signer::RequestSigner;
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;
use strata_core::{
    AccountSnapshot, Balance, ClientOrderId, OrderRequest, OrderStatus, OrderType, OrderUpdate,
    Price, Qty, Symbol, SymbolFilters,
};
use tracing::{debug, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL, e.g. "https://testnet.binance.vision".
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: "https://testnet.binance.vision".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Signed REST client for the exchange.
pub struct RestClient {
    http: Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl RestClient {
    pub fn new(config: RestConfig, credentials: ApiCredentials) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.base_url,
            credentials,
        })
    }

    fn signed_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let signer = RequestSigner::new(&self.credentials);
        let query = signer.sign_params(params, chrono::Utc::now().timestamp_millis());
        format!("{}{}?{}", self.base_url, path, query)
    }

    async fn send_signed(&self, method: Method, url: String) -> ExchangeResult<Response> {
        let response = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()
            .await?;
        Ok(response)
    }

    /// Classify a non-2xx response into the error taxonomy.
    async fn classify_error(response: Response) -> ExchangeError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::TOO_MANY_REQUESTS => ExchangeError::RateLimited,
            // 418 is the exchange's IP-ban escalation of rate limiting.
            StatusCode::IM_A_TEAPOT => ExchangeError::RateLimited,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ExchangeError::Auth(body),
            s if s.is_server_error() => ExchangeError::Server {
                status: s.as_u16(),
                body,
            },
            _ => match serde_json::from_str::<RawApiError>(&body) {
                Ok(api_err) => ExchangeError::Rejected {
                    code: api_err.code,
                    message: api_err.msg,
                },
                Err(_) => ExchangeError::Rejected {
                    code: status.as_u16() as i64,
                    message: body,
                },
            },
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ExchangeResult<T> {
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))
    }

    fn order_params(token: &ClientOrderId, request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params: Vec<(&'static str, String)> = vec![
            ("symbol", request.symbol.to_string()),
            ("side", request.side.to_string()),
            ("type", request.order_type.to_string()),
            ("quantity", request.qty.to_string()),
            ("newClientOrderId", token.to_string()),
        ];
        match request.order_type {
            OrderType::Limit => {
                if let Some(price) = request.limit_price {
                    params.push(("price", price.to_string()));
                }
                params.push(("timeInForce", request.time_in_force.to_string()));
            }
            OrderType::StopMarket => {
                if let Some(stop) = request.stop_price {
                    params.push(("stopPrice", stop.to_string()));
                }
            }
            OrderType::Market => {}
        }
        params
    }

    fn normalize_open_order(raw: RawOpenOrder) -> ExchangeResult<OrderUpdate> {
        let status: OrderStatus = raw
            .status
            .parse()
            .map_err(|_| ExchangeError::InvalidResponse(format!("status {}", raw.status)))?;
        let side = raw
            .side
            .parse()
            .map_err(|_| ExchangeError::InvalidResponse(format!("side {}", raw.side)))?;
        let order_type = match raw.order_type.as_str() {
            "MARKET" => OrderType::Market,
            "LIMIT" => OrderType::Limit,
            "STOP_MARKET" | "STOP_LOSS" => OrderType::StopMarket,
            other => {
                return Err(ExchangeError::InvalidResponse(format!("order type {other}")));
            }
        };
        Ok(OrderUpdate {
            token: ClientOrderId::from_string(raw.client_order_id),
            exchange_id: raw.order_id,
            symbol: Symbol::new(raw.symbol),
            side,
            order_type,
            status,
            qty: Qty::new(raw.orig_qty),
            price: Price::new(raw.price),
            executed_qty: Qty::new(raw.executed_qty),
            last_fill_price: None,
            cumulative_quote: Some(raw.cummulative_quote_qty),
            event_time: raw.update_time,
        })
    }
}

#[async_trait]
impl ExchangeApi for RestClient {
    async fn place_order(
        &self,
        token: &ClientOrderId,
        request: &OrderRequest,
    ) -> ExchangeResult<PlacedOrder> {
        request
            .validate()
            .map_err(|e| ExchangeError::Rejected {
                code: -1,
                message: e.to_string(),
            })?;

        let params = Self::order_params(token, request);
        let url = self.signed_url("/api/v3/order", &params);
        debug!(symbol = %request.symbol, side = %request.side, order_type = %request.order_type, "Placing order");

        let response = self.send_signed(Method::POST, url).await?;
        let ack: RawOrderAck = Self::decode(response).await?;

        let status: OrderStatus = ack
            .status
            .parse()
            .map_err(|_| ExchangeError::InvalidResponse(format!("status {}", ack.status)))?;

        Ok(PlacedOrder {
            exchange_id: ack.order_id,
            status,
            executed_qty: Qty::new(ack.executed_qty),
            avg_fill_price: ack.avg_fill_price().map(Price::new),
        })
    }

    async fn cancel_order(&self, symbol: &Symbol, exchange_id: u64) -> ExchangeResult<CancelAck> {
        let params: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("orderId", exchange_id.to_string()),
        ];
        let url = self.signed_url("/api/v3/order", &params);
        debug!(%symbol, exchange_id, "Cancelling order");

        let response = self.send_signed(Method::DELETE, url).await?;
        let ack: RawCancelAck = Self::decode(response).await?;
        let status: OrderStatus = ack
            .status
            .parse()
            .map_err(|_| ExchangeError::InvalidResponse(format!("status {}", ack.status)))?;

        Ok(CancelAck {
            exchange_id: ack.order_id,
            status,
        })
    }

    async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
        let url = self.signed_url("/api/v3/account", &[]);
        let response = self.send_signed(Method::GET, url).await?;
        let raw: RawAccount = Self::decode(response).await?;

        // Zero balances carry no information; drop them before publication.
        let balances: Vec<Balance> = raw
            .balances
            .into_iter()
            .map(|b| Balance {
                asset: b.asset,
                free: b.free,
                locked: b.locked,
            })
            .filter(Balance::is_nonzero)
            .collect();

        Ok(AccountSnapshot {
            balances,
            fetched_at: chrono::Utc::now().timestamp_millis(),
        })
    }

    async fn symbol_filters(&self, symbol: &Symbol) -> ExchangeResult<SymbolFilters> {
        let url = format!(
            "{}/api/v3/exchangeInfo?symbol={}",
            self.base_url, symbol
        );
        let response = self.http.get(url).send().await?;
        let info: RawExchangeInfo = Self::decode(response).await?;

        let sym_info = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol.as_str())
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("symbol {symbol} not found")))?;

        let mut filters = SymbolFilters::permissive();
        for filter in sym_info.filters {
            match filter {
                RawFilter::LotSize { min_qty, step_size } => {
                    filters.min_qty = Qty::new(min_qty);
                    filters.step_size = Qty::new(step_size);
                }
                RawFilter::PriceFilter { tick_size } => {
                    filters.tick_size = Price::new(tick_size);
                }
                RawFilter::MinNotional { min_notional } | RawFilter::Notional { min_notional } => {
                    filters.min_notional = min_notional;
                }
                RawFilter::Other => {}
            }
        }
        Ok(filters)
    }

    async fn open_orders(&self, symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>> {
        let params: Vec<(&str, String)> = match symbol {
            Some(sym) => vec![("symbol", sym.to_string())],
            None => vec![],
        };
        let url = self.signed_url("/api/v3/openOrders", &params);
        let response = self.send_signed(Method::GET, url).await?;
        let raw: Vec<RawOpenOrder> = Self::decode(response).await?;

        let mut updates = Vec::with_capacity(raw.len());
        for row in raw {
            match Self::normalize_open_order(row) {
                Ok(update) => updates.push(update),
                Err(e) => warn!(error = %e, "Skipping unparseable open order row"),
            }
        }
        Ok(updates)
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        token: &ClientOrderId,
    ) -> ExchangeResult<OrderUpdate> {
        let params: Vec<(&str, String)> = vec![
            ("symbol", symbol.to_string()),
            ("origClientOrderId", token.to_string()),
        ];
        let url = self.signed_url("/api/v3/order", &params);
        debug!(%symbol, %token, "Querying order");

        let response = self.send_signed(Method::GET, url).await?;
        let raw: RawOpenOrder = Self::decode(response).await?;
        Self::normalize_open_order(raw)
    }

    async fn create_listen_key(&self) -> ExchangeResult<String> {
        let url = format!("{}/api/v3/userDataStream", self.base_url);
        let response = self
            .http
            .post(url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()
            .await?;
        let key: RawListenKey = Self::decode(response).await?;
        Ok(key.listen_key)
    }

    async fn keepalive_listen_key(&self, listen_key: &str) -> ExchangeResult<()> {
        let url = format!(
            "{}/api/v3/userDataStream?listenKey={listen_key}",
            self.base_url
        );
        let response = self
            .http
            .put(url)
            .header("X-MBX-APIKEY", self.credentials.api_key())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_limit_request() -> OrderRequest {
        OrderRequest::limit(
            Symbol::new("BTCUSDT"),
            strata_core::OrderSide::Buy,
            Qty::new(dec!(0.001)),
            Price::new(dec!(50000)),
        )
    }

    #[test]
    fn test_order_params_limit() {
        let token = ClientOrderId::from_string("strata_test_1".into());
        let params = RestClient::order_params(&token, &sample_limit_request());

        let find = |k: &str| {
            params
                .iter()
                .find(|(pk, _)| *pk == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(find("symbol"), Some("BTCUSDT"));
        assert_eq!(find("side"), Some("BUY"));
        assert_eq!(find("type"), Some("LIMIT"));
        assert_eq!(find("price"), Some("50000"));
        assert_eq!(find("timeInForce"), Some("GTC"));
        assert_eq!(find("newClientOrderId"), Some("strata_test_1"));
    }

    #[test]
    fn test_order_params_market_omits_price() {
        let token = ClientOrderId::new();
        let request = OrderRequest::market(
            Symbol::new("ETHUSDT"),
            strata_core::OrderSide::Sell,
            Qty::new(dec!(1)),
        );
        let params = RestClient::order_params(&token, &request);
        assert!(!params.iter().any(|(k, _)| *k == "price"));
        assert!(!params.iter().any(|(k, _)| *k == "timeInForce"));
    }

    #[test]
    fn test_order_params_stop_market() {
        let token = ClientOrderId::new();
        let request = OrderRequest::stop_market(
            Symbol::new("BTCUSDT"),
            strata_core::OrderSide::Sell,
            Qty::new(dec!(0.01)),
            Price::new(dec!(45000)),
        );
        let params = RestClient::order_params(&token, &request);
        assert!(params.iter().any(|(k, v)| *k == "stopPrice" && v == "45000"));
    }

    #[test]
    fn test_normalize_open_order() {
        let raw = RawOpenOrder {
            symbol: "BTCUSDT".into(),
            order_id: 42,
            client_order_id: "strata_x".into(),
            price: dec!(50000),
            orig_qty: dec!(0.01),
            executed_qty: dec!(0.002),
            cummulative_quote_qty: dec!(100.4),
            status: "PARTIALLY_FILLED".into(),
            order_type: "LIMIT".into(),
            side: "BUY".into(),
            update_time: 1_700_000_000_000,
        };
        let update = RestClient::normalize_open_order(raw).unwrap();
        assert_eq!(update.exchange_id, 42);
        assert_eq!(update.status, OrderStatus::PartiallyFilled);
        assert_eq!(update.executed_qty, Qty::new(dec!(0.002)));
        assert_eq!(update.cumulative_quote, Some(dec!(100.4)));
    }
}
