//! Single-writer order state machine.

use dashmap::DashMap;
use strata_core::{
    ClientOrderId, ExchangeEvent, Order, OrderStatus, OrderUpdate, Price, Qty, RunId,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};

/// Capacity of the order-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A state change applied to a tracked order.
///
/// Both executor acknowledgements and relay stream events are reduced to
/// this form before entering the transition function, so there is exactly
/// one code path that mutates order state.
#[derive(Debug, Clone)]
pub struct OrderDelta {
    /// Exchange-assigned id, recorded on first sight.
    pub exchange_id: Option<u64>,
    pub status: OrderStatus,
    /// Cumulative executed quantity reported by the exchange.
    pub executed_qty: Option<Qty>,
    /// Quantity-weighted average fill price, when known.
    pub avg_fill_price: Option<Price>,
    /// Source timestamp (Unix milliseconds).
    pub event_time: i64,
}

impl OrderDelta {
    pub fn from_update(update: &OrderUpdate) -> Self {
        Self {
            exchange_id: Some(update.exchange_id),
            status: update.status,
            executed_qty: Some(update.executed_qty),
            avg_fill_price: update.avg_fill_price().or(update.last_fill_price),
            event_time: update.event_time,
        }
    }
}

/// Broadcast notification for an applied state change.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    /// Order state after the transition.
    pub order: Order,
    /// Status before the transition.
    pub previous: OrderStatus,
}

/// Authoritative in-memory store of every order this process has seen.
///
/// Per-order serialization comes from the map's entry locks; no global
/// lock is held across updates to different orders.
pub struct OrderStateTracker {
    orders: DashMap<ClientOrderId, Order>,
    by_exchange_id: DashMap<u64, ClientOrderId>,
    events_tx: broadcast::Sender<OrderEvent>,
}

impl Default for OrderStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderStateTracker {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orders: DashMap::new(),
            by_exchange_id: DashMap::new(),
            events_tx,
        }
    }

    /// Subscribe to applied state changes. Discarded updates (terminal
    /// redeliveries, out-of-order statuses) are never published.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events_tx.subscribe()
    }

    /// Register a new order before submission.
    ///
    /// The token must be unused; the executor generates a fresh token per
    /// logical order and reuses it only across retries of that order.
    pub fn record_pending(&self, order: Order) -> TrackerResult<()> {
        if order.status != OrderStatus::PendingSubmit {
            debug!(token = %order.token, status = ?order.status, "Recording pre-acknowledged order");
        }
        match self.orders.entry(order.token.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(TrackerError::DuplicateOrder(order.token))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(token = %order.token, symbol = %order.symbol, side = ?order.side,
                       qty = %order.qty, "Tracking order");
                slot.insert(order);
                Ok(())
            }
        }
    }

    /// Apply a state change to a tracked order.
    ///
    /// Returns the updated order, or `Ok(None)` when the update was
    /// discarded: the order is already terminal, or the status would move
    /// backwards in the lifecycle. Discards are deliberate no-ops, not
    /// errors, because streams redeliver and REST polls race the stream.
    pub fn transition(
        &self,
        token: &ClientOrderId,
        delta: OrderDelta,
    ) -> TrackerResult<Option<Order>> {
        let updated = {
            let mut entry = self
                .orders
                .get_mut(token)
                .ok_or_else(|| TrackerError::UnknownOrder(token.clone()))?;
            let order = entry.value_mut();
            let previous = order.status;

            if previous.is_terminal() {
                debug!(token = %token, status = ?previous, incoming = ?delta.status,
                       "Discarding update for terminal order");
                return Ok(None);
            }
            if delta.status != previous && !previous.can_transition_to(delta.status) {
                debug!(token = %token, status = ?previous, incoming = ?delta.status,
                       "Discarding out-of-order status update");
                return Ok(None);
            }

            order.status = delta.status;
            if order.exchange_id.is_none() {
                order.exchange_id = delta.exchange_id;
            }
            // Executed quantity is cumulative and must never decrease even
            // if a stale snapshot arrives after a fresher stream event.
            if let Some(executed) = delta.executed_qty {
                if executed > order.executed_qty {
                    order.executed_qty = executed;
                }
            }
            if delta.avg_fill_price.is_some() {
                order.avg_fill_price = delta.avg_fill_price;
            }
            order.updated_at = delta.event_time;

            (order.clone(), previous)
        };

        // Entry lock released; safe to touch the index and publish.
        let (order, previous) = updated;
        if let Some(id) = order.exchange_id {
            self.by_exchange_id.insert(id, token.clone());
        }
        if order.status != previous {
            info!(token = %token, from = ?previous, to = ?order.status,
                  executed = %order.executed_qty, "Order transition");
        }
        let _ = self.events_tx.send(OrderEvent {
            order: order.clone(),
            previous,
        });
        Ok(Some(order))
    }

    /// Apply a relay stream event.
    ///
    /// An update for an unknown token is adopted as an ownerless order so
    /// state stays complete across restarts and reconciliation. Balance
    /// and unknown events are ignored here.
    pub fn apply_event(&self, event: &ExchangeEvent) -> Option<Order> {
        let update = match event {
            ExchangeEvent::OrderUpdate(update) => update,
            ExchangeEvent::BalanceUpdate(_) | ExchangeEvent::Unknown => return None,
        };
        if !self.orders.contains_key(&update.token) {
            warn!(token = %update.token, symbol = %update.symbol,
                  "Adopting untracked order from stream");
            let order = Self::adopt(update);
            if self.record_pending(order).is_err() {
                // Lost the race to another adopter; fall through to transition.
                debug!(token = %update.token, "Order adopted concurrently");
            }
        }
        match self.transition(&update.token, OrderDelta::from_update(update)) {
            Ok(applied) => applied,
            Err(TrackerError::UnknownOrder(token)) => {
                warn!(token = %token, "Order vanished between adoption and transition");
                None
            }
            Err(TrackerError::DuplicateOrder(_)) => None,
        }
    }

    fn adopt(update: &OrderUpdate) -> Order {
        Order {
            token: update.token.clone(),
            exchange_id: Some(update.exchange_id),
            symbol: update.symbol.clone(),
            side: update.side,
            order_type: update.order_type,
            qty: update.qty,
            limit_price: if update.price.is_zero() {
                None
            } else {
                Some(update.price)
            },
            status: OrderStatus::PendingSubmit,
            executed_qty: Qty::ZERO,
            avg_fill_price: None,
            run_id: None,
            updated_at: update.event_time,
        }
    }

    pub fn get(&self, token: &ClientOrderId) -> Option<Order> {
        self.orders.get(token).map(|entry| entry.clone())
    }

    pub fn get_by_exchange_id(&self, exchange_id: u64) -> Option<Order> {
        let token = self.by_exchange_id.get(&exchange_id)?.clone();
        self.get(&token)
    }

    /// All tracked orders that have not reached a terminal state.
    pub fn open_orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| !entry.is_terminal())
            .map(|entry| entry.clone())
            .collect()
    }

    /// Orders owned by a strategy run, terminal or not.
    pub fn orders_for_run(&self, run_id: RunId) -> Vec<Order> {
        self.orders
            .iter()
            .filter(|entry| entry.run_id == Some(run_id))
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use strata_core::{OrderRequest, OrderSide, OrderType, Symbol};

    fn pending_order(token: &ClientOrderId) -> Order {
        let request = OrderRequest::limit(
            Symbol::new("BTCUSDT"),
            OrderSide::Buy,
            Qty::new(dec!(1.0)),
            Price::new(dec!(50000)),
        );
        Order::pending(token.clone(), &request, None)
    }

    fn delta(status: OrderStatus, executed: &str) -> OrderDelta {
        OrderDelta {
            exchange_id: Some(77),
            status,
            executed_qty: Some(Qty::new(executed.parse().unwrap())),
            avg_fill_price: None,
            event_time: 1_700_000_000_000,
        }
    }

    #[test]
    fn acknowledgement_moves_pending_to_new() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();

        let order = tracker
            .transition(&token, delta(OrderStatus::New, "0"))
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.exchange_id, Some(77));
    }

    #[test]
    fn duplicate_token_is_rejected() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        assert!(matches!(
            tracker.record_pending(pending_order(&token)),
            Err(TrackerError::DuplicateOrder(_))
        ));
    }

    #[test]
    fn terminal_redelivery_is_a_noop() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::Filled, "1.0"))
            .unwrap();

        // Stream redelivers the FILLED report.
        let applied = tracker
            .transition(&token, delta(OrderStatus::Filled, "1.0"))
            .unwrap();
        assert!(applied.is_none());
        assert_eq!(tracker.get(&token).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn status_never_moves_backwards() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::PartiallyFilled, "0.4"))
            .unwrap();

        let applied = tracker
            .transition(&token, delta(OrderStatus::New, "0"))
            .unwrap();
        assert!(applied.is_none());

        let order = tracker.get(&token).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.executed_qty, Qty::new(dec!(0.4)));
    }

    #[test]
    fn executed_qty_is_monotonic() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::PartiallyFilled, "0.6"))
            .unwrap();

        // A stale poll reports less executed than the stream already did.
        let order = tracker
            .transition(&token, delta(OrderStatus::PartiallyFilled, "0.2"))
            .unwrap()
            .unwrap();
        assert_eq!(order.executed_qty, Qty::new(dec!(0.6)));
    }

    #[test]
    fn rejection_before_acknowledgement() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();

        let order = tracker
            .transition(&token, delta(OrderStatus::Rejected, "0"))
            .unwrap()
            .unwrap();
        assert!(order.is_terminal());
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[test]
    fn exchange_id_lookup() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::New, "0"))
            .unwrap();

        let order = tracker.get_by_exchange_id(77).unwrap();
        assert_eq!(order.token, token);
    }

    #[test]
    fn unknown_token_errors() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        assert!(matches!(
            tracker.transition(&token, delta(OrderStatus::New, "0")),
            Err(TrackerError::UnknownOrder(_))
        ));
    }

    #[test]
    fn stream_event_for_untracked_order_is_adopted() {
        let tracker = OrderStateTracker::new();
        let update = OrderUpdate {
            token: ClientOrderId::from_string("strata_1_abcd1234".into()),
            exchange_id: 901,
            symbol: Symbol::new("ETHUSDT"),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            status: OrderStatus::PartiallyFilled,
            qty: Qty::new(dec!(2.0)),
            price: Price::new(dec!(3000)),
            executed_qty: Qty::new(dec!(0.5)),
            last_fill_price: Some(Price::new(dec!(3001))),
            cumulative_quote: Some(dec!(1500.5)),
            event_time: 1_700_000_000_000,
        };

        let order = tracker
            .apply_event(&ExchangeEvent::OrderUpdate(update))
            .unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.executed_qty, Qty::new(dec!(0.5)));
        assert_eq!(order.avg_fill_price, Some(Price::new(dec!(3001))));
        assert!(order.run_id.is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[tokio::test]
    async fn applied_transitions_are_broadcast() {
        let tracker = OrderStateTracker::new();
        let mut events = tracker.subscribe();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::New, "0"))
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.previous, OrderStatus::PendingSubmit);
        assert_eq!(event.order.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn discarded_updates_are_not_broadcast() {
        let tracker = OrderStateTracker::new();
        let token = ClientOrderId::new();
        tracker.record_pending(pending_order(&token)).unwrap();
        tracker
            .transition(&token, delta(OrderStatus::Filled, "1.0"))
            .unwrap();

        let mut events = tracker.subscribe();
        tracker
            .transition(&token, delta(OrderStatus::Filled, "1.0"))
            .unwrap();
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
