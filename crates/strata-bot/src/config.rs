//! Application configuration.
//!
//! TOML file plus `STRATA__`-prefixed environment overrides, with serde
//! defaults for every knob. API credentials never live in the file; they
//! are read from `STRATA_API_KEY` / `STRATA_API_SECRET` at startup.

use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strata_core::{OrderSide, Price, Qty, Symbol};
use strata_exchange::RestConfig;
use strata_strategy::{GridParams, RejectPolicy, TwapParams};

use crate::error::{AppError, AppResult};

/// Exchange endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST base URL.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    /// Websocket base URL; the listen key path is appended by the relay.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// REST request timeout (ms).
    #[serde(default = "default_rest_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rest_url() -> String {
    "https://testnet.binance.vision".to_string()
}

fn default_ws_url() -> String {
    "wss://stream.testnet.binance.vision".to_string()
}

fn default_rest_timeout_ms() -> u64 {
    10_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            ws_url: default_ws_url(),
            timeout_ms: default_rest_timeout_ms(),
        }
    }
}

impl From<&ExchangeConfig> for RestConfig {
    fn from(cfg: &ExchangeConfig) -> Self {
        Self {
            base_url: cfg.rest_url.clone(),
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

/// User-data stream configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for reconnection backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Ping cadence (ms).
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    /// Idle window before the session is recycled (ms).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Listen-key keepalive cadence (seconds).
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    /// Event broadcast buffer size.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_ping_interval_ms() -> u64 {
    30_000
}

fn default_idle_timeout_ms() -> u64 {
    90_000
}

fn default_keepalive_interval_secs() -> u64 {
    1800
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Order submission configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum submission attempts per order.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay (ms).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Retry delay ceiling (ms).
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Admission gate: maximum new orders per interval.
    #[serde(default = "default_budget_max_orders")]
    pub budget_max_orders: u32,
    /// Admission gate interval (ms).
    #[serde(default = "default_budget_interval_ms")]
    pub budget_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_budget_max_orders() -> u32 {
    20
}

fn default_budget_interval_ms() -> u64 {
    1000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            budget_max_orders: default_budget_max_orders(),
            budget_interval_ms: default_budget_interval_ms(),
        }
    }
}

impl From<&ExecutorConfig> for strata_executor::ExecutorConfig {
    fn from(cfg: &ExecutorConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            retry_base_delay_ms: cfg.retry_base_delay_ms,
            retry_max_delay_ms: cfg.retry_max_delay_ms,
            budget_max_orders: cfg.budget_max_orders,
            budget_interval_ms: cfg.budget_interval_ms,
        }
    }
}

/// A TWAP run declared in the config file, started at boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwapRunConfig {
    pub symbol: String,
    /// "BUY" or "SELL".
    pub side: String,
    pub total_qty: Decimal,
    pub slices: u32,
    pub interval_secs: u64,
    #[serde(default)]
    pub limit_price: Option<Decimal>,
    /// "continue" (default) or "abort".
    #[serde(default = "default_reject_policy")]
    pub reject_policy: String,
}

fn default_reject_policy() -> String {
    "continue".to_string()
}

impl TwapRunConfig {
    pub fn to_params(&self) -> AppResult<TwapParams> {
        Ok(TwapParams {
            symbol: Symbol::new(self.symbol.clone()),
            side: parse_side(&self.side)?,
            total_qty: Qty::new(self.total_qty),
            slices: self.slices,
            interval: Duration::from_secs(self.interval_secs),
            limit_price: self.limit_price.map(Price::new),
            reject_policy: parse_reject_policy(&self.reject_policy)?,
        })
    }
}

/// A grid run declared in the config file, started at boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRunConfig {
    pub symbol: String,
    pub lower: Decimal,
    pub upper: Decimal,
    pub levels: u32,
    pub qty_per_level: Decimal,
    pub reference_price: Decimal,
    #[serde(default)]
    pub rearm_spread: Decimal,
    #[serde(default = "default_max_rejections")]
    pub max_rejections: u32,
}

fn default_max_rejections() -> u32 {
    3
}

impl GridRunConfig {
    pub fn to_params(&self) -> GridParams {
        GridParams {
            symbol: Symbol::new(self.symbol.clone()),
            lower: Price::new(self.lower),
            upper: Price::new(self.upper),
            levels: self.levels,
            qty_per_level: Qty::new(self.qty_per_level),
            reference_price: Price::new(self.reference_price),
            rearm_spread: self.rearm_spread,
            max_rejections: self.max_rejections,
        }
    }
}

fn parse_side(s: &str) -> AppResult<OrderSide> {
    OrderSide::from_str(s).map_err(|e| AppError::Config(e.to_string()))
}

fn parse_reject_policy(s: &str) -> AppResult<RejectPolicy> {
    match s.to_lowercase().as_str() {
        "continue" => Ok(RejectPolicy::Continue),
        "abort" => Ok(RejectPolicy::Abort),
        other => Err(AppError::Config(format!(
            "unknown reject_policy: {other} (expected \"continue\" or \"abort\")"
        ))),
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// TWAP runs to start at boot.
    #[serde(default)]
    pub twap: Vec<TwapRunConfig>,
    /// Grid runs to start at boot.
    #[serde(default)]
    pub grid: Vec<GridRunConfig>,
}

impl AppConfig {
    /// Load from a TOML file with `STRATA__SECTION__KEY` env overrides.
    /// A missing file falls back to defaults.
    pub fn load(path: &str) -> AppResult<Self> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("STRATA").separator("__"))
            .build()
            .map_err(|e| AppError::Config(format!("failed to load config: {e}")))?
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }

    pub fn rest_config(&self) -> RestConfig {
        RestConfig::from(&self.exchange)
    }

    pub fn relay_config(&self) -> strata_relay::RelayConfig {
        strata_relay::RelayConfig {
            ws_base_url: self.exchange.ws_url.clone(),
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            ping_interval_ms: self.websocket.ping_interval_ms,
            idle_timeout_ms: self.websocket.idle_timeout_ms,
            keepalive_interval_secs: self.websocket.keepalive_interval_secs,
            event_buffer: self.websocket.event_buffer,
        }
    }

    pub fn executor_config(&self) -> strata_executor::ExecutorConfig {
        strata_executor::ExecutorConfig::from(&self.executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.websocket.max_reconnect_attempts, 0);
        assert_eq!(config.executor.max_attempts, 3);
        assert!(config.twap.is_empty());
        assert!(config.grid.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [exchange]
            rest_url = "https://api.binance.com"
            ws_url = "wss://stream.binance.com:9443"

            [executor]
            max_attempts = 5

            [[twap]]
            symbol = "BTCUSDT"
            side = "BUY"
            total_qty = "1.5"
            slices = 6
            interval_secs = 60

            [[grid]]
            symbol = "ETHUSDT"
            lower = "1500"
            upper = "1600"
            levels = 5
            qty_per_level = "0.1"
            reference_price = "1550"
            rearm_spread = "2"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.exchange.rest_url, "https://api.binance.com");
        assert_eq!(config.executor.max_attempts, 5);
        // Unspecified knobs keep their defaults.
        assert_eq!(config.executor.budget_max_orders, 20);

        let twap = config.twap[0].to_params().unwrap();
        assert_eq!(twap.total_qty, Qty::new(dec!(1.5)));
        assert_eq!(twap.side, OrderSide::Buy);
        assert_eq!(twap.reject_policy, RejectPolicy::Continue);

        let grid = config.grid[0].to_params();
        assert_eq!(grid.levels, 5);
        assert_eq!(grid.rearm_spread, dec!(2));
        assert_eq!(grid.max_rejections, 3);
    }

    #[test]
    fn test_bad_side_rejected() {
        let run = TwapRunConfig {
            symbol: "BTCUSDT".to_string(),
            side: "HOLD".to_string(),
            total_qty: dec!(1),
            slices: 2,
            interval_secs: 1,
            limit_price: None,
            reject_policy: default_reject_policy(),
        };
        assert!(run.to_params().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("rest_url"));
        assert!(toml_str.contains("max_attempts"));
    }
}
