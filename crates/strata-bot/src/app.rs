//! Main application orchestration.
//!
//! Wires the REST client, event relay, order tracker, executor, and
//! strategy registry together, starts the runs declared in config, and
//! winds everything down on ctrl-c.

use std::sync::Arc;

use strata_exchange::{ApiCredentials, ExchangeApi, RestClient};
use strata_executor::OrderExecutor;
use strata_relay::ExchangeEventRelay;
use strata_strategy::{StrategyContext, StrategyRunRegistry};
use strata_telemetry::Metrics;
use strata_tracker::OrderStateTracker;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Main application.
pub struct Application {
    config: AppConfig,
    relay: Arc<ExchangeEventRelay>,
    tracker: Arc<OrderStateTracker>,
    registry: Arc<StrategyRunRegistry>,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the component graph. Credentials come from the environment.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let credentials = ApiCredentials::from_env().ok_or_else(|| {
            AppError::Config("STRATA_API_KEY / STRATA_API_SECRET not set".to_string())
        })?;

        let rest = RestClient::new(config.rest_config(), credentials)?;
        let api: Arc<dyn ExchangeApi> = Arc::new(rest);

        let tracker = Arc::new(OrderStateTracker::new());
        let executor = Arc::new(OrderExecutor::new(
            config.executor_config(),
            api.clone(),
            tracker.clone(),
        ));
        let relay = Arc::new(ExchangeEventRelay::new(
            config.relay_config(),
            api.clone(),
            tracker.clone(),
        ));
        let registry = Arc::new(StrategyRunRegistry::new(StrategyContext {
            executor,
            tracker: tracker.clone(),
            api,
        }));

        Ok(Self {
            config,
            relay,
            tracker,
            registry,
            shutdown: CancellationToken::new(),
        })
    }

    /// Run until ctrl-c, then cancel strategies and close the stream.
    pub async fn run(&self) -> AppResult<()> {
        let relay_task = tokio::spawn({
            let relay = self.relay.clone();
            async move {
                if let Err(e) = relay.run().await {
                    error!(error = %e, "Event relay stopped");
                }
            }
        });

        let bridge_task = tokio::spawn(bridge_events(
            self.relay.subscribe(),
            self.tracker.clone(),
            self.shutdown.clone(),
        ));

        self.start_configured_runs()?;
        info!(
            twap = self.config.twap.len(),
            grid = self.config.grid.len(),
            "Application running"
        );

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        self.registry.shutdown();
        self.relay.shutdown();
        self.shutdown.cancel();
        let _ = relay_task.await;
        let _ = bridge_task.await;

        for run in self.registry.runs() {
            info!(run_id = %run.run_id, state = run.state.as_str(), "Final run state");
        }
        Ok(())
    }

    fn start_configured_runs(&self) -> AppResult<()> {
        for twap in &self.config.twap {
            let run_id = self.registry.start_twap(twap.to_params()?)?;
            info!(%run_id, symbol = %twap.symbol, "Started TWAP run from config");
        }
        for grid in &self.config.grid {
            let run_id = self.registry.start_grid(grid.to_params())?;
            info!(%run_id, symbol = %grid.symbol, "Started grid run from config");
        }
        Ok(())
    }
}

/// Feed relay events into the tracker until shutdown.
async fn bridge_events(
    mut events: broadcast::Receiver<strata_core::ExchangeEvent>,
    tracker: Arc<OrderStateTracker>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = events.recv() => match result {
                Ok(event) => {
                    if let Some(order) = tracker.apply_event(&event) {
                        debug!(token = %order.token, status = %order.status, "Order updated from stream");
                        Metrics::open_orders_set(tracker.open_orders().len() as i64);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Event bridge lagged behind the relay");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
