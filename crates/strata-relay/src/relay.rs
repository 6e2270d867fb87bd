//! User-data stream session supervisor.
//!
//! Owns the listen-key lifecycle, the websocket session, reconnection
//! with exponential backoff and jitter, and the reconciliation snapshot
//! replayed after every reconnect.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use strata_core::{ClientOrderId, ExchangeEvent};
use strata_exchange::ExchangeApi;
use strata_telemetry::Metrics;
use strata_tracker::OrderStateTracker;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RelayError, RelayResult};
use crate::parser::parse_event;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Websocket base URL; the listen key is appended as `/ws/{key}`.
    pub ws_base_url: String,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Ping cadence while the session is idle.
    pub ping_interval_ms: u64,
    /// Session is torn down if nothing arrives within this window.
    pub idle_timeout_ms: u64,
    /// Listen-key keepalive cadence.
    pub keepalive_interval_secs: u64,
    /// Broadcast channel capacity; lagging subscribers lose the oldest.
    pub event_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ws_base_url: String::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
            ping_interval_ms: 30000,
            idle_timeout_ms: 90000,
            keepalive_interval_secs: 1800,
            event_buffer: 1024,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// Persistent user-data stream relay.
pub struct ExchangeEventRelay {
    config: RelayConfig,
    api: Arc<dyn ExchangeApi>,
    /// Read-only view of local order state, consulted during
    /// reconciliation to find orders that resolved while disconnected.
    tracker: Arc<OrderStateTracker>,
    state: Arc<RwLock<ConnectionState>>,
    events_tx: broadcast::Sender<ExchangeEvent>,
    shutdown_token: CancellationToken,
}

impl ExchangeEventRelay {
    pub fn new(
        config: RelayConfig,
        api: Arc<dyn ExchangeApi>,
        tracker: Arc<OrderStateTracker>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_buffer);
        Self {
            config,
            api,
            tracker,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events_tx,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Subscribe to the normalized event stream.
    ///
    /// Subscribers that fall behind lose the oldest events; they never
    /// block the relay.
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events_tx.subscribe()
    }

    /// Get current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Signal graceful shutdown.
    ///
    /// Cancels the shutdown token, which makes the session loop and any
    /// in-progress backoff wait exit promptly.
    pub fn shutdown(&self) {
        info!("Relay shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        Metrics::relay_state_set(state.as_str());
    }

    /// Run the relay until shutdown or the retry budget is exhausted.
    pub async fn run(&self) -> RelayResult<()> {
        let mut attempt = 0u32;
        let mut reconcile = false;

        loop {
            if self.is_shutdown() {
                info!("Shutdown requested, exiting relay loop");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            let reason = match self.run_session(reconcile).await {
                Ok(()) => {
                    info!("User-data stream closed");
                    "closed"
                }
                Err(e) => {
                    error!(?e, "User-data stream error");
                    match e {
                        RelayError::HeartbeatTimeout => "heartbeat_timeout",
                        RelayError::ListenKey(_) => "listen_key",
                        RelayError::Reconcile(_) => "reconcile",
                        _ => "transport",
                    }
                }
            };
            Metrics::relay_disconnected();

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max reconnection attempts reached");
                return Err(RelayError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            self.set_state(ConnectionState::Reconnecting);
            Metrics::relay_reconnect(reason);

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }

            // Every session after the first is a reconnect and must be
            // followed by exactly one reconciliation pass.
            reconcile = true;
        }
    }

    async fn run_session(&self, reconcile: bool) -> RelayResult<()> {
        let listen_key = self
            .api
            .create_listen_key()
            .await
            .map_err(|e| RelayError::ListenKey(e.to_string()))?;
        let url = format!("{}/ws/{}", self.config.ws_base_url, listen_key);

        info!(url = %self.config.ws_base_url, "Connecting to user-data stream");
        let (ws_stream, _response) = connect_async_tls_with_config(&url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        self.set_state(ConnectionState::Connected);
        Metrics::relay_connected();
        info!("User-data stream connected");

        if reconcile {
            self.reconcile().await?;
        }

        let mut keepalive =
            tokio::time::interval(Duration::from_secs(self.config.keepalive_interval_secs));
        keepalive.tick().await; // first tick fires immediately
        let mut ping = tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms));
        ping.tick().await;
        let idle_timeout = Duration::from_millis(self.config.idle_timeout_ms);
        let mut last_message = Instant::now();

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in session loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_message = Instant::now();
                            self.handle_payload(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_message = Instant::now();
                            debug!("Received ping, sending pong");
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_message = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "User-data stream closed by server");
                            return Err(RelayError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(?e, "User-data stream read error");
                            return Err(e.into());
                        }
                        None => {
                            warn!("User-data stream ended");
                            return Err(RelayError::ConnectionClosed {
                                code: 1006,
                                reason: "Stream ended".to_string(),
                            });
                        }
                        _ => {}
                    }
                }

                _ = keepalive.tick() => {
                    debug!("Sending listen-key keepalive");
                    if let Err(e) = self.api.keepalive_listen_key(&listen_key).await {
                        // A dead listen key stops event delivery silently;
                        // restart the session to get a fresh one.
                        warn!(?e, "Listen-key keepalive failed");
                        return Err(RelayError::ListenKey(e.to_string()));
                    }
                }

                _ = ping.tick() => {
                    if last_message.elapsed() > idle_timeout {
                        error!("Heartbeat timeout");
                        return Err(RelayError::HeartbeatTimeout);
                    }
                    write.send(Message::Ping(Vec::new())).await?;
                }
            }
        }
    }

    /// Normalize and publish one raw payload.
    ///
    /// Decode failures are counted and dropped; they never tear down the
    /// session.
    fn handle_payload(&self, text: &str) {
        let event = match parse_event(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(?e, "Failed to decode stream payload");
                Metrics::relay_decode_failure();
                ExchangeEvent::Unknown
            }
        };

        let kind = match &event {
            ExchangeEvent::OrderUpdate(_) => "order_update",
            ExchangeEvent::BalanceUpdate(_) => "balance_update",
            ExchangeEvent::Unknown => "unknown",
        };
        Metrics::relay_event(kind);

        if self.events_tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    /// Replay authoritative state through the event channel.
    ///
    /// Runs once per reconnect: the balance snapshot and every open order
    /// flow through the same normalized path as live events, so
    /// subscribers converge without a dedicated reconciliation API.
    async fn reconcile(&self) -> RelayResult<()> {
        info!("Reconciling after reconnect");

        let snapshot = self
            .api
            .account_snapshot()
            .await
            .map_err(|e| RelayError::Reconcile(e.to_string()))?;
        let balance_update = strata_core::BalanceUpdate {
            balances: snapshot.balances,
            event_time: snapshot.fetched_at,
        };
        Metrics::relay_event("balance_update");
        let _ = self
            .events_tx
            .send(ExchangeEvent::BalanceUpdate(balance_update));

        let open_orders = self
            .api
            .open_orders(None)
            .await
            .map_err(|e| RelayError::Reconcile(e.to_string()))?;
        let count = open_orders.len();
        let exchange_tokens: HashSet<ClientOrderId> =
            open_orders.iter().map(|u| u.token.clone()).collect();
        for update in open_orders {
            Metrics::relay_event("order_update");
            let _ = self.events_tx.send(ExchangeEvent::OrderUpdate(update));
        }

        // Orders we still hold open that the exchange no longer lists
        // reached a terminal state during the gap. The open-order snapshot
        // cannot say which, so each one is queried individually and its
        // final report replayed through the channel.
        let mut resolved = 0usize;
        for order in self.tracker.open_orders() {
            if order.exchange_id.is_none() || exchange_tokens.contains(&order.token) {
                continue;
            }
            match self.api.query_order(&order.symbol, &order.token).await {
                Ok(update) => {
                    Metrics::relay_event("order_update");
                    let _ = self.events_tx.send(ExchangeEvent::OrderUpdate(update));
                    resolved += 1;
                }
                Err(e) => {
                    // Left open locally; the next reconnect retries it.
                    warn!(token = %order.token, ?e, "Failed to resolve order missing from open set");
                }
            }
        }

        info!(open_orders = count, resolved, "Reconciliation complete");
        Ok(())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        // Jitter desynchronizes reconnect stampedes across instances.
        let jitter = rand::thread_rng().gen_range(0..=1000);
        Duration::from_millis(delay + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strata_core::{
        AccountSnapshot, Balance, ClientOrderId, Order, OrderRequest, OrderSide, OrderStatus,
        OrderType, OrderUpdate, Price, Qty, Symbol, SymbolFilters,
    };
    use strata_exchange::{CancelAck, ExchangeResult, PlacedOrder};
    use strata_tracker::OrderDelta;

    struct NullApi;

    #[async_trait]
    impl ExchangeApi for NullApi {
        async fn place_order(
            &self,
            _token: &ClientOrderId,
            _request: &OrderRequest,
        ) -> ExchangeResult<PlacedOrder> {
            unimplemented!()
        }
        async fn cancel_order(
            &self,
            _symbol: &Symbol,
            _exchange_id: u64,
        ) -> ExchangeResult<CancelAck> {
            unimplemented!()
        }
        async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
            unimplemented!()
        }
        async fn symbol_filters(&self, _symbol: &Symbol) -> ExchangeResult<SymbolFilters> {
            unimplemented!()
        }
        async fn open_orders(&self, _symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>> {
            unimplemented!()
        }
        async fn query_order(
            &self,
            _symbol: &Symbol,
            _token: &ClientOrderId,
        ) -> ExchangeResult<OrderUpdate> {
            unimplemented!()
        }
        async fn create_listen_key(&self) -> ExchangeResult<String> {
            unimplemented!()
        }
        async fn keepalive_listen_key(&self, _listen_key: &str) -> ExchangeResult<()> {
            unimplemented!()
        }
    }

    fn relay() -> ExchangeEventRelay {
        ExchangeEventRelay::new(
            RelayConfig::default(),
            Arc::new(NullApi),
            Arc::new(OrderStateTracker::new()),
        )
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.max_reconnect_attempts, 0); // Infinite
        assert_eq!(config.keepalive_interval_secs, 1800);
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(relay().state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let r = relay();
        let base = r.config.reconnect_base_delay_ms;
        let max = r.config.reconnect_max_delay_ms;

        let first = r.backoff_delay(1).as_millis() as u64;
        assert!((base..=base + 1000).contains(&first));

        let third = r.backoff_delay(3).as_millis() as u64;
        assert!((base * 4..=base * 4 + 1000).contains(&third));

        let late = r.backoff_delay(30).as_millis() as u64;
        assert!(late <= max + 1000);
    }

    #[test]
    fn test_decode_failure_publishes_unknown() {
        let r = relay();
        let mut events = r.subscribe();
        r.handle_payload("not json at all");
        assert_eq!(events.try_recv().unwrap(), ExchangeEvent::Unknown);
    }

    /// Stub exchange that serves one reconciliation snapshot.
    struct SnapshotApi;

    #[async_trait]
    impl ExchangeApi for SnapshotApi {
        async fn place_order(
            &self,
            _token: &ClientOrderId,
            _request: &OrderRequest,
        ) -> ExchangeResult<PlacedOrder> {
            unimplemented!()
        }
        async fn cancel_order(
            &self,
            _symbol: &Symbol,
            _exchange_id: u64,
        ) -> ExchangeResult<CancelAck> {
            unimplemented!()
        }
        async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
            Ok(AccountSnapshot {
                balances: vec![Balance {
                    asset: "USDT".into(),
                    free: dec!(1000),
                    locked: dec!(0),
                }],
                fetched_at: 1_700_000_000_000,
            })
        }
        async fn symbol_filters(&self, _symbol: &Symbol) -> ExchangeResult<SymbolFilters> {
            unimplemented!()
        }
        async fn open_orders(&self, _symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>> {
            Ok(vec![OrderUpdate {
                token: ClientOrderId::from_string("strata_1_abc".to_string()),
                exchange_id: 11,
                symbol: Symbol::new("BTCUSDT"),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                status: OrderStatus::New,
                qty: Qty::new(dec!(0.5)),
                price: Price::new(dec!(50000)),
                executed_qty: Qty::ZERO,
                last_fill_price: None,
                cumulative_quote: None,
                event_time: 1_700_000_000_000,
            }])
        }
        async fn query_order(
            &self,
            _symbol: &Symbol,
            _token: &ClientOrderId,
        ) -> ExchangeResult<OrderUpdate> {
            unimplemented!()
        }
        async fn create_listen_key(&self) -> ExchangeResult<String> {
            Ok("listen-key".to_string())
        }
        async fn keepalive_listen_key(&self, _listen_key: &str) -> ExchangeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reconcile_replays_snapshot_before_live_events() {
        let r = ExchangeEventRelay::new(
            RelayConfig::default(),
            Arc::new(SnapshotApi),
            Arc::new(OrderStateTracker::new()),
        );
        let mut events = r.subscribe();

        r.reconcile().await.unwrap();
        // Snapshot arrives first, then open orders, on the same channel a
        // live session publishes to.
        match events.try_recv().unwrap() {
            ExchangeEvent::BalanceUpdate(update) => {
                assert_eq!(update.balances[0].asset, "USDT");
            }
            other => panic!("expected balance update first, got {other:?}"),
        }
        match events.try_recv().unwrap() {
            ExchangeEvent::OrderUpdate(update) => assert_eq!(update.exchange_id, 11),
            other => panic!("expected order update, got {other:?}"),
        }
        assert!(events.try_recv().is_err());
    }

    /// Stub for a session gap where everything closed while offline: the
    /// exchange reports nothing open, but querying any order says FILLED.
    struct GapApi;

    #[async_trait]
    impl ExchangeApi for GapApi {
        async fn place_order(
            &self,
            _token: &ClientOrderId,
            _request: &OrderRequest,
        ) -> ExchangeResult<PlacedOrder> {
            unimplemented!()
        }
        async fn cancel_order(
            &self,
            _symbol: &Symbol,
            _exchange_id: u64,
        ) -> ExchangeResult<CancelAck> {
            unimplemented!()
        }
        async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
            Ok(AccountSnapshot {
                balances: vec![],
                fetched_at: 1_700_000_000_000,
            })
        }
        async fn symbol_filters(&self, _symbol: &Symbol) -> ExchangeResult<SymbolFilters> {
            unimplemented!()
        }
        async fn open_orders(&self, _symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>> {
            Ok(vec![])
        }
        async fn query_order(
            &self,
            symbol: &Symbol,
            token: &ClientOrderId,
        ) -> ExchangeResult<OrderUpdate> {
            Ok(OrderUpdate {
                token: token.clone(),
                exchange_id: 77,
                symbol: symbol.clone(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                status: OrderStatus::Filled,
                qty: Qty::new(dec!(0.5)),
                price: Price::new(dec!(50000)),
                executed_qty: Qty::new(dec!(0.5)),
                last_fill_price: Some(Price::new(dec!(50000))),
                cumulative_quote: None,
                event_time: 1_700_000_001_000,
            })
        }
        async fn create_listen_key(&self) -> ExchangeResult<String> {
            Ok("listen-key".to_string())
        }
        async fn keepalive_listen_key(&self, _listen_key: &str) -> ExchangeResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reconcile_resolves_orders_closed_during_gap() {
        // An order acknowledged before the disconnect does not show up in
        // the open-order snapshot after it; its close report must still
        // reach subscribers.
        let tracker = Arc::new(OrderStateTracker::new());
        let token = ClientOrderId::from_string("strata_2_def".to_string());
        let request = OrderRequest::limit(
            Symbol::new("BTCUSDT"),
            OrderSide::Buy,
            Qty::new(dec!(0.5)),
            Price::new(dec!(50000)),
        );
        tracker
            .record_pending(Order::pending(token.clone(), &request, None))
            .unwrap();
        tracker
            .transition(
                &token,
                OrderDelta {
                    exchange_id: Some(77),
                    status: OrderStatus::New,
                    executed_qty: None,
                    avg_fill_price: None,
                    event_time: 1_700_000_000_000,
                },
            )
            .unwrap();

        let r = ExchangeEventRelay::new(RelayConfig::default(), Arc::new(GapApi), tracker.clone());
        let mut events = r.subscribe();
        r.reconcile().await.unwrap();

        match events.try_recv().unwrap() {
            ExchangeEvent::BalanceUpdate(_) => {}
            other => panic!("expected balance update first, got {other:?}"),
        }
        let event = events.try_recv().unwrap();
        match &event {
            ExchangeEvent::OrderUpdate(update) => {
                assert_eq!(update.token, token);
                assert_eq!(update.status, OrderStatus::Filled);
            }
            other => panic!("expected resolved order update, got {other:?}"),
        }

        // Replaying it through the tracker retires the stale entry.
        tracker.apply_event(&event);
        assert!(tracker.open_orders().is_empty());
    }

    /// Api stub for driving the full session loop: serves listen keys and
    /// empty reconciliation state, counting snapshot fetches.
    struct CountingApi {
        snapshots: AtomicUsize,
    }

    #[async_trait]
    impl ExchangeApi for CountingApi {
        async fn place_order(
            &self,
            _token: &ClientOrderId,
            _request: &OrderRequest,
        ) -> ExchangeResult<PlacedOrder> {
            unimplemented!()
        }
        async fn cancel_order(
            &self,
            _symbol: &Symbol,
            _exchange_id: u64,
        ) -> ExchangeResult<CancelAck> {
            unimplemented!()
        }
        async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
            self.snapshots.fetch_add(1, Ordering::SeqCst);
            Ok(AccountSnapshot {
                balances: vec![],
                fetched_at: 1_700_000_000_000,
            })
        }
        async fn symbol_filters(&self, _symbol: &Symbol) -> ExchangeResult<SymbolFilters> {
            unimplemented!()
        }
        async fn open_orders(&self, _symbol: Option<&Symbol>) -> ExchangeResult<Vec<OrderUpdate>> {
            Ok(vec![])
        }
        async fn query_order(
            &self,
            _symbol: &Symbol,
            _token: &ClientOrderId,
        ) -> ExchangeResult<OrderUpdate> {
            unimplemented!()
        }
        async fn create_listen_key(&self) -> ExchangeResult<String> {
            Ok("listen-key".to_string())
        }
        async fn keepalive_listen_key(&self, _listen_key: &str) -> ExchangeResult<()> {
            Ok(())
        }
    }

    fn execution_report(order_id: u64) -> String {
        format!(
            concat!(
                r#"{{"e":"executionReport","E":1700000000000,"s":"BTCUSDT","#,
                r#""c":"strata_1_live{id}","S":"BUY","o":"LIMIT","q":"0.5","#,
                r#""p":"50000","X":"NEW","i":{id},"z":"0","L":"0","Z":"0"}}"#
            ),
            id = order_id
        )
    }

    async fn next_event(events: &mut broadcast::Receiver<ExchangeEvent>) -> ExchangeEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("relay event channel closed")
    }

    #[tokio::test]
    async fn test_run_reconciles_once_after_reconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // Session 1: one live report, then the server drops the socket.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(execution_report(101))).await.unwrap();
            drop(ws);

            // Session 2: one live report, then stay up until the client
            // closes during shutdown.
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(execution_report(202))).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let api = Arc::new(CountingApi {
            snapshots: AtomicUsize::new(0),
        });
        let config = RelayConfig {
            ws_base_url: format!("ws://{addr}"),
            reconnect_base_delay_ms: 10,
            reconnect_max_delay_ms: 20,
            ..RelayConfig::default()
        };
        let relay = Arc::new(ExchangeEventRelay::new(
            config,
            api.clone(),
            Arc::new(OrderStateTracker::new()),
        ));
        let mut events = relay.subscribe();

        let relay_task = tokio::spawn({
            let relay = relay.clone();
            async move { relay.run().await }
        });

        // Session 1 forwards live events with no snapshot replay: the
        // first connect is not a reconnect.
        match next_event(&mut events).await {
            ExchangeEvent::OrderUpdate(update) => assert_eq!(update.exchange_id, 101),
            other => panic!("expected first live event, got {other:?}"),
        }

        // After the drop, exactly one reconciliation precedes resumed
        // forwarding.
        match next_event(&mut events).await {
            ExchangeEvent::BalanceUpdate(_) => {}
            other => panic!("expected reconciliation snapshot, got {other:?}"),
        }
        match next_event(&mut events).await {
            ExchangeEvent::OrderUpdate(update) => assert_eq!(update.exchange_id, 202),
            other => panic!("expected resumed live event, got {other:?}"),
        }
        assert_eq!(api.snapshots.load(Ordering::SeqCst), 1);

        relay.shutdown();
        relay_task.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[test]
    fn test_shutdown_flag() {
        let r = relay();
        assert!(!r.is_shutdown());
        r.shutdown();
        assert!(r.is_shutdown());
    }
}
