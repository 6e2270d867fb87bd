//! Order submission and cancellation against the exchange.

use std::sync::Arc;
use std::time::Instant;

use strata_core::{ClientOrderId, Order, OrderRequest, OrderStatus, RunId};
use strata_exchange::{ExchangeApi, ExchangeError};
use strata_telemetry::Metrics;
use strata_tracker::{OrderDelta, OrderStateTracker, TrackerError};
use tracing::{debug, info, warn};

use crate::backoff::ExponentialBackoff;
use crate::budget::ActionBudget;
use crate::error::{ExecutorError, ExecutorResult};

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum submission attempts per order (first try included).
    pub max_attempts: u32,
    /// Base delay between retries.
    pub retry_base_delay_ms: u64,
    /// Ceiling for retry delays.
    pub retry_max_delay_ms: u64,
    /// Admission gate: maximum new orders per interval.
    pub budget_max_orders: u32,
    /// Admission gate interval.
    pub budget_interval_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 5000,
            budget_max_orders: 20,
            budget_interval_ms: 1000,
        }
    }
}

/// Single path through which orders reach the exchange.
pub struct OrderExecutor {
    api: Arc<dyn ExchangeApi>,
    tracker: Arc<OrderStateTracker>,
    budget: ActionBudget,
    config: ExecutorConfig,
}

impl OrderExecutor {
    pub fn new(
        config: ExecutorConfig,
        api: Arc<dyn ExchangeApi>,
        tracker: Arc<OrderStateTracker>,
    ) -> Self {
        let budget = ActionBudget::new(config.budget_max_orders, config.budget_interval_ms);
        Self {
            api,
            tracker,
            budget,
            config,
        }
    }

    /// Submit an order, retrying transient failures with the same token.
    ///
    /// The idempotency token is generated once per logical order and
    /// reused across every retry, so the exchange deduplicates rather
    /// than creating a second order. Definitive rejections (bad params,
    /// filter violations, insufficient balance) are not retried; the
    /// order ends `Rejected` in the tracker and the error surfaces to
    /// the caller.
    pub async fn submit(
        &self,
        request: OrderRequest,
        run_id: Option<RunId>,
    ) -> ExecutorResult<Order> {
        request.validate()?;

        if !self.budget.consume() {
            Metrics::order_submitted("budget_exhausted");
            warn!(symbol = %request.symbol, "Submission budget exhausted");
            return Err(ExecutorError::BudgetExhausted);
        }

        let token = ClientOrderId::new();
        let pending = Order::pending(token.clone(), &request, run_id);
        self.tracker.record_pending(pending)?;

        info!(token = %token, symbol = %request.symbol, side = %request.side,
              order_type = %request.order_type, qty = %request.qty, "Submitting order");

        let started = Instant::now();
        let mut backoff =
            ExponentialBackoff::new(self.config.retry_base_delay_ms, self.config.retry_max_delay_ms);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.api.place_order(&token, &request).await {
                Ok(ack) => {
                    Metrics::order_submitted("accepted");
                    Metrics::submit_latency(
                        &request.order_type.to_string(),
                        started.elapsed().as_secs_f64() * 1000.0,
                    );
                    Metrics::order_transition(&ack.status.to_string().to_lowercase());
                    debug!(token = %token, exchange_id = ack.exchange_id,
                           status = %ack.status, attempt, "Order acknowledged");

                    let delta = OrderDelta {
                        exchange_id: Some(ack.exchange_id),
                        status: ack.status,
                        executed_qty: Some(ack.executed_qty),
                        avg_fill_price: ack.avg_fill_price,
                        event_time: chrono::Utc::now().timestamp_millis(),
                    };
                    return match self.tracker.transition(&token, delta)? {
                        Some(order) => Ok(order),
                        // A stream event raced ahead of the acknowledgement;
                        // the tracker already holds fresher state.
                        None => self
                            .tracker
                            .get(&token)
                            .ok_or(ExecutorError::Tracker(TrackerError::UnknownOrder(token))),
                    };
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    Metrics::order_retry();
                    let delay = backoff.next_delay();
                    warn!(token = %token, attempt, ?e, delay_ms = delay.as_millis(),
                          "Transient submission failure, retrying with same token");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    Metrics::order_submitted("rejected");
                    warn!(token = %token, attempt, ?e, "Order submission failed");
                    self.mark_rejected(&token);
                    return Err(ExecutorError::Exchange(e));
                }
            }
        }
    }

    /// Cancel a tracked order by its token.
    ///
    /// Returns the latest order snapshot. Cancelling an already-terminal
    /// order is a no-op; a fill racing the cancel wins and is not
    /// reversed.
    pub async fn cancel(&self, token: &ClientOrderId) -> ExecutorResult<Order> {
        let order = self
            .tracker
            .get(token)
            .ok_or_else(|| ExecutorError::Tracker(TrackerError::UnknownOrder(token.clone())))?;

        if order.is_terminal() {
            debug!(token = %token, status = %order.status, "Cancel of terminal order is a no-op");
            return Ok(order);
        }
        let Some(exchange_id) = order.exchange_id else {
            return Err(ExecutorError::NotAcknowledged(token.to_string()));
        };

        info!(token = %token, exchange_id, "Cancelling order");

        let mut backoff =
            ExponentialBackoff::new(self.config.retry_base_delay_ms, self.config.retry_max_delay_ms);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.api.cancel_order(&order.symbol, exchange_id).await {
                Ok(ack) => {
                    Metrics::cancel("accepted");
                    let delta = OrderDelta {
                        exchange_id: Some(ack.exchange_id),
                        status: ack.status,
                        executed_qty: None,
                        avg_fill_price: None,
                        event_time: chrono::Utc::now().timestamp_millis(),
                    };
                    return match self.tracker.transition(token, delta)? {
                        Some(order) => Ok(order),
                        None => self
                            .tracker
                            .get(token)
                            .ok_or_else(|| {
                                ExecutorError::Tracker(TrackerError::UnknownOrder(token.clone()))
                            }),
                    };
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(token = %token, attempt, ?e, delay_ms = delay.as_millis(),
                          "Transient cancel failure, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(ExchangeError::Rejected { code, message }) => {
                    // Usually the order filled or was already cancelled
                    // before the request landed; the stream event is
                    // authoritative.
                    Metrics::cancel("rejected");
                    warn!(token = %token, code, %message, "Cancel rejected by exchange");
                    return self.tracker.get(token).ok_or_else(|| {
                        ExecutorError::Tracker(TrackerError::UnknownOrder(token.clone()))
                    });
                }
                Err(e) => {
                    Metrics::cancel("rejected");
                    warn!(token = %token, attempt, ?e, "Cancel failed");
                    return Err(ExecutorError::Exchange(e));
                }
            }
        }
    }

    /// Remaining submissions in the current budget interval.
    pub fn budget_remaining(&self) -> u32 {
        self.budget.remaining()
    }

    fn mark_rejected(&self, token: &ClientOrderId) {
        let delta = OrderDelta {
            exchange_id: None,
            status: OrderStatus::Rejected,
            executed_qty: None,
            avg_fill_price: None,
            event_time: chrono::Utc::now().timestamp_millis(),
        };
        if let Err(e) = self.tracker.transition(token, delta) {
            warn!(token = %token, ?e, "Failed to record rejection");
        }
    }
}
