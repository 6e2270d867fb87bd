//! Order vocabulary: sides, types, statuses, identifiers.

use crate::error::{CoreError, Result};
use crate::{Price, Qty, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order side: buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(CoreError::InvalidOrder(format!("unknown side: {other}"))),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Market => write!(f, "MARKET"),
            Self::Limit => write!(f, "LIMIT"),
            Self::StopMarket => write!(f, "STOP_MARKET"),
        }
    }
}

/// Time-in-force for resting orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled (the default for grid resting orders).
    #[default]
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    /// Fill-or-kill.
    #[serde(rename = "FOK")]
    FillOrKill,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoodTilCancelled => write!(f, "GTC"),
            Self::ImmediateOrCancel => write!(f, "IOC"),
            Self::FillOrKill => write!(f, "FOK"),
        }
    }
}

/// Client order ID: the idempotency token for submissions.
///
/// CRITICAL: retries of the same submission must reuse the same token so
/// the exchange deduplicates instead of creating a second order. The token
/// is the primary handle for an order until the exchange id is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Create a new unique client order ID.
    ///
    /// Format: `strata_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("strata_{ts}_{uuid_short}"))
    }

    /// Create from an existing string (for parsing stream events).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientOrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClientOrderId {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl AsRef<str> for ClientOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strategy run identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidOrder(format!("bad run id: {e}")))
    }
}

/// Order lifecycle status.
///
/// `PendingSubmit` is local-only: recorded before the exchange call so the
/// order exists even if the process observes the fill before the submit
/// response. `Filled`, `Canceled`, `Rejected` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Recorded locally, exchange call not yet acknowledged.
    #[default]
    PendingSubmit,
    /// Accepted by the exchange, resting or working.
    New,
    /// Partially executed.
    PartiallyFilled,
    /// Completely executed.
    Filled,
    /// Cancelled before completion.
    Canceled,
    /// Refused by the exchange (or failed submission).
    Rejected,
    /// Expired by the exchange.
    Expired,
}

impl OrderStatus {
    /// Returns true if no further transition is accepted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order can still be cancelled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::PendingSubmit | Self::New | Self::PartiallyFilled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Terminal states accept nothing. Execution never regresses:
    /// `PartiallyFilled` cannot go back to `New` or `PendingSubmit`,
    /// `New` cannot go back to `PendingSubmit`. Same-status updates are
    /// legal so repeated fill reports can bump the executed quantity.
    #[must_use]
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (PendingSubmit, _) => true,
            (New, PendingSubmit) => false,
            (New, _) => true,
            (PartiallyFilled, PendingSubmit | New) => false,
            (PartiallyFilled, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PendingSubmit => "PENDING_SUBMIT",
            Self::New => "NEW",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING_SUBMIT" | "PENDING_NEW" => Ok(Self::PendingSubmit),
            "NEW" | "ACCEPTED" => Ok(Self::New),
            "PARTIALLY_FILLED" => Ok(Self::PartiallyFilled),
            "FILLED" => Ok(Self::Filled),
            "CANCELED" | "PENDING_CANCEL" => Ok(Self::Canceled),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(Self::Expired),
            other => Err(CoreError::InvalidOrder(format!("unknown status: {other}"))),
        }
    }
}

/// Parameters for a single order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Qty,
    /// Required for LIMIT orders.
    pub limit_price: Option<Price>,
    /// Required for STOP_MARKET orders.
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: OrderSide, qty: Qty) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            qty,
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::GoodTilCancelled,
        }
    }

    pub fn limit(symbol: Symbol, side: OrderSide, qty: Qty, price: Price) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            qty,
            limit_price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::GoodTilCancelled,
        }
    }

    pub fn stop_market(symbol: Symbol, side: OrderSide, qty: Qty, stop_price: Price) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::StopMarket,
            qty,
            limit_price: None,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::GoodTilCancelled,
        }
    }

    /// Structural validation before submission.
    pub fn validate(&self) -> Result<()> {
        if !self.qty.is_positive() {
            return Err(CoreError::InvalidOrder(format!(
                "quantity must be positive, got {}",
                self.qty
            )));
        }
        match self.order_type {
            OrderType::Limit if self.limit_price.is_none() => Err(CoreError::InvalidOrder(
                "price is required for LIMIT orders".into(),
            )),
            OrderType::StopMarket if self.stop_price.is_none() => Err(CoreError::InvalidOrder(
                "stop price is required for STOP_MARKET orders".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Snapshot of one exchange order owned by the system.
///
/// Identity is the client token; `exchange_id` is assigned on acceptance
/// and may be absent until then. Mutation happens only inside the order
/// state tracker; everything else sees cloned snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Client-generated idempotency token.
    pub token: ClientOrderId,
    /// Exchange-assigned order id, absent until acceptance.
    pub exchange_id: Option<u64>,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Requested quantity.
    pub qty: Qty,
    pub limit_price: Option<Price>,
    pub status: OrderStatus,
    /// Cumulative executed quantity; never decreases.
    pub executed_qty: Qty,
    /// Average fill price, absent until the first fill.
    pub avg_fill_price: Option<Price>,
    /// Owning strategy run, absent for manual orders.
    pub run_id: Option<RunId>,
    /// Last update timestamp (Unix milliseconds).
    pub updated_at: i64,
}

impl Order {
    /// Create the pre-submission record for a request.
    #[must_use]
    pub fn pending(token: ClientOrderId, request: &OrderRequest, run_id: Option<RunId>) -> Self {
        Self {
            token,
            exchange_id: None,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            qty: request.qty,
            limit_price: request.limit_price,
            status: OrderStatus::PendingSubmit,
            executed_qty: Qty::ZERO,
            avg_fill_price: None,
            run_id,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Remaining unfilled quantity.
    #[must_use]
    pub fn remaining_qty(&self) -> Qty {
        self.qty - self.executed_qty
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[test]
    fn test_client_order_id_unique() {
        let id1 = ClientOrderId::new();
        let id2 = ClientOrderId::new();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("strata_"));
    }

    #[test]
    fn test_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;
        assert!(PendingSubmit.can_transition_to(New));
        assert!(PendingSubmit.can_transition_to(Rejected));
        assert!(PendingSubmit.can_transition_to(Filled)); // aggressive market order
        assert!(New.can_transition_to(PartiallyFilled));
        assert!(New.can_transition_to(Canceled));
        assert!(New.can_transition_to(Expired));
        assert!(PartiallyFilled.can_transition_to(PartiallyFilled));
        assert!(PartiallyFilled.can_transition_to(Filled));
        assert!(PartiallyFilled.can_transition_to(Canceled));

        // No regression
        assert!(!New.can_transition_to(PendingSubmit));
        assert!(!PartiallyFilled.can_transition_to(New));

        // Nothing leaves a terminal state
        assert!(!Filled.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(New));
        assert!(!Rejected.can_transition_to(Filled));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("NEW".parse::<OrderStatus>().unwrap(), OrderStatus::New);
        assert_eq!(
            "PARTIALLY_FILLED".parse::<OrderStatus>().unwrap(),
            OrderStatus::PartiallyFilled
        );
        assert!("BOGUS".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_request_validation() {
        let sym = Symbol::new("BTCUSDT");
        let market = OrderRequest::market(sym.clone(), OrderSide::Buy, Qty::new(dec!(0.1)));
        assert!(market.validate().is_ok());

        let mut limit = OrderRequest::limit(
            sym.clone(),
            OrderSide::Sell,
            Qty::new(dec!(0.1)),
            Price::new(dec!(50000)),
        );
        assert!(limit.validate().is_ok());
        limit.limit_price = None;
        assert!(limit.validate().is_err());

        let zero = OrderRequest::market(sym.clone(), OrderSide::Buy, Qty::ZERO);
        assert!(zero.validate().is_err());

        let mut stop = OrderRequest::stop_market(
            sym,
            OrderSide::Sell,
            Qty::new(dec!(0.1)),
            Price::new(dec!(45000)),
        );
        assert!(stop.validate().is_ok());
        stop.stop_price = None;
        assert!(stop.validate().is_err());
    }

    #[test]
    fn test_order_pending_snapshot() {
        let req = OrderRequest::limit(
            Symbol::new("ETHUSDT"),
            OrderSide::Buy,
            Qty::new(dec!(1.5)),
            Price::new(dec!(3000)),
        );
        let token = ClientOrderId::new();
        let order = Order::pending(token.clone(), &req, None);
        assert_eq!(order.token, token);
        assert_eq!(order.status, OrderStatus::PendingSubmit);
        assert_eq!(order.executed_qty, Qty::ZERO);
        assert_eq!(order.remaining_qty(), Qty::new(dec!(1.5)));
        assert!(order.exchange_id.is_none());
    }
}
