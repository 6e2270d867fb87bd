//! Time-sliced execution (TWAP).
//!
//! Splits "N units over K slices every T seconds" into child market or
//! limit orders. Slice quantities are rounded to the exchange step size
//! with the remainder absorbed by the final slice, so the submitted sum
//! equals the requested total exactly.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use strata_core::{OrderRequest, OrderSide, Price, Qty, RunId, Symbol, SymbolFilters};
use strata_exchange::ExchangeApi;
use strata_executor::OrderExecutor;
use strata_tracker::OrderStateTracker;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StrategyError, StrategyResult};
use crate::run::{finish_run, RejectPolicy, RunState, SharedSnapshot};

/// TWAP run parameters.
#[derive(Debug, Clone)]
pub struct TwapParams {
    pub symbol: Symbol,
    pub side: OrderSide,
    pub total_qty: Qty,
    /// Number of child orders.
    pub slices: u32,
    /// Time between slices.
    pub interval: Duration,
    /// Limit price for slices; `None` submits market orders.
    pub limit_price: Option<Price>,
    pub reject_policy: RejectPolicy,
}

impl TwapParams {
    pub fn validate(&self) -> StrategyResult<()> {
        if self.slices == 0 {
            return Err(StrategyError::InvalidParams("slices must be >= 1".into()));
        }
        if self.interval.is_zero() {
            return Err(StrategyError::InvalidParams("interval must be > 0".into()));
        }
        if !self.total_qty.is_positive() {
            return Err(StrategyError::InvalidParams(
                "total quantity must be positive".into(),
            ));
        }
        if let Some(price) = self.limit_price {
            if !price.is_positive() {
                return Err(StrategyError::InvalidParams(
                    "limit price must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Split a total quantity into per-slice quantities.
///
/// Each slice except the last is `total / slices` rounded down to the
/// step size; the last slice absorbs the remainder. The sum is exact.
pub fn slice_quantities(total: Qty, slices: u32, step: Qty) -> Vec<Qty> {
    let base = (total / Decimal::from(slices)).round_to_step(step);
    let mut quantities = vec![base; slices as usize];
    let consumed = Qty::new(base.inner() * Decimal::from(slices - 1));
    quantities[slices as usize - 1] = total - consumed;
    quantities
}

/// Drives one TWAP run to completion.
pub struct TwapScheduler {
    executor: Arc<OrderExecutor>,
    tracker: Arc<OrderStateTracker>,
    api: Arc<dyn ExchangeApi>,
}

impl TwapScheduler {
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

    /// Run until every slice is emitted and the final slice settles, or
    /// the run is cancelled. The terminal state lands in `snapshot`.
    pub async fn run(
        &self,
        run_id: RunId,
        params: TwapParams,
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

        let quantities = slice_quantities(params.total_qty, params.slices, filters.step_size);
        if let Err(e) = check_slices(&quantities, &filters) {
            warn!(%run_id, ?e, "TWAP parameters violate symbol filters");
            finish_run(&snapshot, RunState::Failed);
            return;
        }

        info!(%run_id, symbol = %params.symbol, side = %params.side,
              total = %params.total_qty, slices = params.slices,
              interval_ms = params.interval.as_millis(), "TWAP run starting");

        let mut ticker = tokio::time::interval(params.interval);
        let mut last_token = None;

        for (index, qty) in quantities.iter().enumerate() {
            // First tick fires immediately: slice 1 goes out at start.
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(%run_id, emitted = index, "TWAP run cancelled");
                    self.cancel_children(&snapshot).await;
                    finish_run(&snapshot, RunState::Cancelled);
                    return;
                }
                _ = ticker.tick() => {}
            }

            let request = match params.limit_price {
                Some(price) => OrderRequest::limit(params.symbol.clone(), params.side, *qty, price),
                None => OrderRequest::market(params.symbol.clone(), params.side, *qty),
            };

            match self.executor.submit(request, Some(run_id)).await {
                Ok(order) => {
                    debug!(%run_id, slice = index + 1, token = %order.token, qty = %qty,
                           "Slice submitted");
                    snapshot.write().child_orders.push(order.token.clone());
                    last_token = Some(order.token);
                }
                Err(e) => {
                    warn!(%run_id, slice = index + 1, ?e, "Slice rejected");
                    snapshot.write().rejected_children += 1;
                    if params.reject_policy == RejectPolicy::Abort {
                        finish_run(&snapshot, RunState::Failed);
                        return;
                    }
                }
            }
        }

        // Completion reflects execution, not dispatch: wait for the final
        // slice to reach a terminal order state.
        if let Some(token) = last_token {
            let mut events = self.tracker.subscribe();
            loop {
                match self.tracker.get(&token) {
                    Some(order) if order.is_terminal() => break,
                    None => break,
                    Some(_) => {}
                }
                tokio::select! {
                    () = cancel.cancelled() => {
                        info!(%run_id, "TWAP run cancelled while settling");
                        self.cancel_children(&snapshot).await;
                        finish_run(&snapshot, RunState::Cancelled);
                        return;
                    }
                    event = events.recv() => match event {
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(%run_id, skipped, "Lagged behind tracker events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        let rejected = snapshot.read().rejected_children;
        if rejected == 0 {
            finish_run(&snapshot, RunState::Completed);
        } else {
            finish_run(&snapshot, RunState::CompletedWithErrors);
        }
    }

    /// Cancel every non-terminal child order.
    async fn cancel_children(&self, snapshot: &SharedSnapshot) {
        let tokens = snapshot.read().child_orders.clone();
        for token in tokens {
            let Some(order) = self.tracker.get(&token) else {
                continue;
            };
            if order.is_terminal() {
                continue;
            }
            if let Err(e) = self.executor.cancel(&token).await {
                warn!(token = %token, ?e, "Failed to cancel child order");
            }
        }
    }
}

fn check_slices(quantities: &[Qty], filters: &SymbolFilters) -> StrategyResult<()> {
    for qty in quantities {
        if !filters.qty_acceptable(*qty) {
            return Err(StrategyError::InvalidParams(format!(
                "slice quantity {qty} below exchange minimum"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slices_sum_exactly() {
        let quantities = slice_quantities(Qty::new(dec!(1.0)), 3, Qty::new(dec!(0.01)));
        assert_eq!(quantities.len(), 3);
        assert_eq!(quantities[0], Qty::new(dec!(0.33)));
        assert_eq!(quantities[1], Qty::new(dec!(0.33)));
        // Final slice absorbs the remainder.
        assert_eq!(quantities[2], Qty::new(dec!(0.34)));

        let sum = quantities.iter().fold(Qty::ZERO, |acc, q| acc + *q);
        assert_eq!(sum, Qty::new(dec!(1.0)));
    }

    #[test]
    fn test_even_split_has_no_remainder() {
        let quantities = slice_quantities(Qty::new(dec!(0.9)), 3, Qty::new(dec!(0.1)));
        assert!(quantities.iter().all(|q| *q == Qty::new(dec!(0.3))));
    }

    #[test]
    fn test_single_slice_is_the_total() {
        let quantities = slice_quantities(Qty::new(dec!(0.777)), 1, Qty::new(dec!(0.001)));
        assert_eq!(quantities, vec![Qty::new(dec!(0.777))]);
    }

    #[test]
    fn test_non_final_slices_are_step_multiples() {
        let step = Qty::new(dec!(0.001));
        let quantities = slice_quantities(Qty::new(dec!(2.5)), 7, step);
        for qty in &quantities[..6] {
            assert_eq!(qty.round_to_step(step), *qty);
        }
        let sum = quantities.iter().fold(Qty::ZERO, |acc, q| acc + *q);
        assert_eq!(sum, Qty::new(dec!(2.5)));
    }

    #[test]
    fn test_params_validation() {
        let params = TwapParams {
            symbol: Symbol::new("BTCUSDT"),
            side: OrderSide::Buy,
            total_qty: Qty::new(dec!(1)),
            slices: 0,
            interval: Duration::from_secs(1),
            limit_price: None,
            reject_policy: RejectPolicy::default(),
        };
        assert!(params.validate().is_err());

        let params = TwapParams {
            slices: 3,
            interval: Duration::ZERO,
            ..params
        };
        assert!(params.validate().is_err());

        let params = TwapParams {
            interval: Duration::from_secs(1),
            ..params
        };
        assert!(params.validate().is_ok());
    }
}
