//! Grid trading: a ladder of resting limit orders.
//!
//! Levels are spaced arithmetically between the configured bounds,
//! buying below the reference price and selling at or above it. A
//! filled level is immediately re-armed with the opposite side offset
//! by the configured spread, keeping the ladder populated.

use std::sync::Arc;

use rust_decimal::Decimal;
use strata_core::{
    ClientOrderId, OrderRequest, OrderSide, OrderStatus, Price, Qty, RunId, Symbol, SymbolFilters,
};
use strata_exchange::ExchangeApi;
use strata_executor::OrderExecutor;
use strata_telemetry::Metrics;
use strata_tracker::{OrderEvent, OrderStateTracker};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StrategyError, StrategyResult};
use crate::run::{finish_run, RunState, SharedSnapshot};

/// Grid run parameters.
#[derive(Debug, Clone)]
pub struct GridParams {
    pub symbol: Symbol,
    /// Lowest level price.
    pub lower: Price,
    /// Highest level price.
    pub upper: Price,
    /// Number of levels, bounds inclusive.
    pub levels: u32,
    pub qty_per_level: Qty,
    /// Market price used to split levels into buys below and sells at or
    /// above.
    pub reference_price: Price,
    /// Price offset applied when re-arming a filled level with the
    /// opposite side.
    pub rearm_spread: Decimal,
    /// Definitive rejections tolerated before the run is failed and the
    /// remaining ladder torn down.
    pub max_rejections: u32,
}

impl GridParams {
    pub fn validate(&self) -> StrategyResult<()> {
        if self.levels < 2 {
            return Err(StrategyError::InvalidParams("levels must be >= 2".into()));
        }
        if self.upper <= self.lower {
            return Err(StrategyError::InvalidParams(
                "upper bound must exceed lower bound".into(),
            ));
        }
        if !self.qty_per_level.is_positive() {
            return Err(StrategyError::InvalidParams(
                "quantity per level must be positive".into(),
            ));
        }
        if !self.reference_price.is_positive() {
            return Err(StrategyError::InvalidParams(
                "reference price must be positive".into(),
            ));
        }
        if self.rearm_spread.is_sign_negative() {
            return Err(StrategyError::InvalidParams(
                "re-arm spread must not be negative".into(),
            ));
        }
        if self.max_rejections == 0 {
            return Err(StrategyError::InvalidParams(
                "rejection limit must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Level prices: `lower + i * (upper - lower) / (levels - 1)`, rounded
/// to the tick size, bounds inclusive.
pub fn grid_prices(lower: Price, upper: Price, levels: u32, tick: Price) -> Vec<Price> {
    let span = upper.inner() - lower.inner();
    let divisions = Decimal::from(levels - 1);
    (0..levels)
        .map(|i| {
            // Multiply before dividing so the bounds land exactly.
            let offset = span * Decimal::from(i) / divisions;
            Price::new(lower.inner() + offset).round_to_tick(tick)
        })
        .collect()
}

/// One price rung. At most one live order at any time.
#[derive(Debug, Clone)]
struct GridLevel {
    price: Price,
    side: OrderSide,
    /// Token of the resting order, absent while a (re-)submission failed.
    token: Option<ClientOrderId>,
}

/// Drives one grid run until cancelled.
pub struct GridManager {
    executor: Arc<OrderExecutor>,
    tracker: Arc<OrderStateTracker>,
    api: Arc<dyn ExchangeApi>,
}

impl GridManager {
    pub fn new(
        executor: Arc<OrderExecutor>,
        tracker: Arc<OrderStateTracker>,
        api: Arc<dyn ExchangeApi>,
    ) -> Self {
        Self {
            executor,
            tracker,
            api,
        }
    }

    /// Place the ladder, then react to fills until cancelled.
    pub async fn run(
        &self,
        run_id: RunId,
        params: GridParams,
        snapshot: SharedSnapshot,
        cancel: CancellationToken,
    ) {
        let filters = match self.api.symbol_filters(&params.symbol).await {
            Ok(filters) => filters,
            Err(e) => {
                warn!(%run_id, ?e, "Failed to fetch symbol filters");
                finish_run(&snapshot, RunState::Failed);
                return;
            }
        };

        let qty = params.qty_per_level.round_to_step(filters.step_size);
        if !filters.qty_acceptable(qty) {
            warn!(%run_id, %qty, "Level quantity below exchange minimum");
            finish_run(&snapshot, RunState::Failed);
            return;
        }

        let mut levels: Vec<GridLevel> =
            grid_prices(params.lower, params.upper, params.levels, filters.tick_size)
                .into_iter()
                .map(|price| GridLevel {
                    price,
                    side: if price < params.reference_price {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    },
                    token: None,
                })
                .collect();

        info!(%run_id, symbol = %params.symbol, levels = levels.len(),
              lower = %params.lower, upper = %params.upper,
              reference = %params.reference_price, "Grid run starting");

        // Subscribe before placing so no fill can slip between the first
        // placement and the reactive loop.
        let mut events = self.tracker.subscribe();

        for index in 0..levels.len() {
            if cancel.is_cancelled() {
                self.cancel_levels(&levels).await;
                finish_run(&snapshot, RunState::Cancelled);
                return;
            }
            let level = &levels[index];
            let request = OrderRequest::limit(
                params.symbol.clone(),
                level.side,
                qty,
                level.price,
            );
            match self.executor.submit(request, Some(run_id)).await {
                Ok(order) => {
                    debug!(%run_id, level = index, price = %level.price, side = %level.side,
                           token = %order.token, "Level placed");
                    snapshot.write().child_orders.push(order.token.clone());
                    levels[index].token = Some(order.token);
                }
                Err(e) => {
                    warn!(%run_id, level = index, price = %level.price, ?e,
                          "Failed to place level order");
                    if Self::record_rejection(&snapshot) >= params.max_rejections {
                        warn!(%run_id, limit = params.max_rejections,
                              "Rejection limit reached while placing ladder");
                        self.cancel_levels(&levels).await;
                        finish_run(&snapshot, RunState::Failed);
                        return;
                    }
                }
            }
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(%run_id, "Grid run cancelled");
                    self.cancel_levels(&levels).await;
                    finish_run(&snapshot, RunState::Cancelled);
                    return;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        let over_limit = self.handle_event(run_id, &params, &filters, qty,
                                                           &mut levels, &snapshot, event).await;
                        if over_limit {
                            warn!(%run_id, limit = params.max_rejections,
                                  "Rejection limit reached while re-arming");
                            self.cancel_levels(&levels).await;
                            finish_run(&snapshot, RunState::Failed);
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%run_id, skipped, "Lagged behind tracker events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(%run_id, "Tracker event channel closed");
                        finish_run(&snapshot, RunState::Failed);
                        return;
                    }
                }
            }
        }
    }

    fn record_rejection(snapshot: &SharedSnapshot) -> u32 {
        let mut run = snapshot.write();
        run.rejected_children += 1;
        run.rejected_children
    }

    /// Re-arm a filled level with the opposite side.
    ///
    /// A filled BUY at price P re-arms as a SELL at P + spread; a filled
    /// SELL re-arms as a BUY at P - spread. Returns true when the
    /// rejection limit has been reached and the run must stop.
    async fn handle_event(
        &self,
        run_id: RunId,
        params: &GridParams,
        filters: &SymbolFilters,
        qty: Qty,
        levels: &mut [GridLevel],
        snapshot: &SharedSnapshot,
        event: OrderEvent,
    ) -> bool {
        if event.order.run_id != Some(run_id) || event.order.status != OrderStatus::Filled {
            return false;
        }
        let Some(index) = levels
            .iter()
            .position(|level| level.token.as_ref() == Some(&event.order.token))
        else {
            return false;
        };

        let level = &levels[index];
        let (side, price) = match level.side {
            OrderSide::Buy => (
                OrderSide::Sell,
                Price::new(level.price.inner() + params.rearm_spread),
            ),
            OrderSide::Sell => (
                OrderSide::Buy,
                Price::new(level.price.inner() - params.rearm_spread),
            ),
        };
        let price = price.round_to_tick(filters.tick_size);

        info!(%run_id, level = index, filled = %level.side, rearm = %side, %price,
              "Level filled, re-arming opposite side");

        let request = OrderRequest::limit(params.symbol.clone(), side, qty, price);
        match self.executor.submit(request, Some(run_id)).await {
            Ok(order) => {
                Metrics::grid_rearm();
                snapshot.write().child_orders.push(order.token.clone());
                levels[index].side = side;
                levels[index].price = price;
                levels[index].token = Some(order.token);
                false
            }
            Err(e) => {
                warn!(%run_id, level = index, ?e, "Failed to re-arm level");
                levels[index].token = None;
                Self::record_rejection(snapshot) >= params.max_rejections
            }
        }
    }

    /// Cancel every live level order. Fills racing the cancellation win
    /// and are not reversed.
    async fn cancel_levels(&self, levels: &[GridLevel]) {
        for level in levels {
            let Some(token) = &level.token else { continue };
            let Some(order) = self.tracker.get(token) else {
                continue;
            };
            if order.is_terminal() {
                continue;
            }
            if let Err(e) = self.executor.cancel(token).await {
                warn!(token = %token, ?e, "Failed to cancel level order");
            }
        }
    }
}
