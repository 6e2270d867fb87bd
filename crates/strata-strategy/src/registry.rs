//! Process-wide table of strategy runs.
//!
//! Owns every run's snapshot, cancellation token, and task handle. No
//! ambient state: cancelling a run flips its token, and the run's own
//! task observes it before the next scheduled action.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use strata_core::{Qty, RunId};
use strata_exchange::ExchangeApi;
use strata_executor::OrderExecutor;
use strata_telemetry::Metrics;
use strata_tracker::OrderStateTracker;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{StrategyError, StrategyResult};
use crate::grid::{GridManager, GridParams};
use crate::run::{RunSnapshot, RunState, SharedSnapshot, StrategyKind};
use crate::twap::{TwapParams, TwapScheduler};

/// Collaborators every strategy task needs.
#[derive(Clone)]
pub struct StrategyContext {
    pub executor: Arc<OrderExecutor>,
    pub tracker: Arc<OrderStateTracker>,
    pub api: Arc<dyn ExchangeApi>,
}

struct RunEntry {
    snapshot: SharedSnapshot,
    cancel: CancellationToken,
    /// Taken by the first `wait` call; parking_lot so the registry never
    /// awaits while holding a map shard.
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Registry of active and finished strategy runs.
pub struct StrategyRunRegistry {
    ctx: StrategyContext,
    runs: DashMap<RunId, RunEntry>,
}

impl StrategyRunRegistry {
    pub fn new(ctx: StrategyContext) -> Self {
        Self {
            ctx,
            runs: DashMap::new(),
        }
    }

    /// Start a TWAP run; returns its id immediately.
    pub fn start_twap(&self, params: TwapParams) -> StrategyResult<RunId> {
        params.validate()?;

        let run_id = RunId::new();
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(RunSnapshot::new(
            run_id,
            StrategyKind::Twap,
            params.symbol.clone(),
            params.side,
            params.total_qty,
        )));
        let cancel = CancellationToken::new();

        info!(%run_id, symbol = %params.symbol, "Registering TWAP run");

        let scheduler = TwapScheduler::new(
            self.ctx.executor.clone(),
            self.ctx.tracker.clone(),
            self.ctx.api.clone(),
        );
        let task = tokio::spawn({
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            async move {
                scheduler.run(run_id, params, snapshot, cancel).await;
            }
        });

        self.insert(run_id, snapshot, cancel, task);
        Ok(run_id)
    }

    /// Start a grid run; returns its id immediately.
    pub fn start_grid(&self, params: GridParams) -> StrategyResult<RunId> {
        params.validate()?;

        let run_id = RunId::new();
        let target_qty = Qty::new(params.qty_per_level.inner() * Decimal::from(params.levels));
        // Ladder side is per level; the run-level side reflects nothing
        // meaningful for a grid, so record the opening bias.
        let side = strata_core::OrderSide::Buy;
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(RunSnapshot::new(
            run_id,
            StrategyKind::Grid,
            params.symbol.clone(),
            side,
            target_qty,
        )));
        let cancel = CancellationToken::new();

        info!(%run_id, symbol = %params.symbol, levels = params.levels, "Registering grid run");

        let manager = GridManager::new(
            self.ctx.executor.clone(),
            self.ctx.tracker.clone(),
            self.ctx.api.clone(),
        );
        let task = tokio::spawn({
            let snapshot = snapshot.clone();
            let cancel = cancel.clone();
            async move {
                manager.run(run_id, params, snapshot, cancel).await;
            }
        });

        self.insert(run_id, snapshot, cancel, task);
        Ok(run_id)
    }

    /// Request cooperative cancellation of a run.
    ///
    /// Idempotent: cancelling an already-cancelled or finished run is a
    /// no-op `Ok`. Only an unknown id is an error.
    pub fn cancel(&self, run_id: RunId) -> StrategyResult<()> {
        let entry = self
            .runs
            .get(&run_id)
            .ok_or(StrategyError::UnknownRun(run_id))?;
        info!(%run_id, "Cancelling strategy run");
        entry.cancel.cancel();
        Ok(())
    }

    /// Current snapshot of a run.
    pub fn status(&self, run_id: RunId) -> StrategyResult<RunSnapshot> {
        let entry = self
            .runs
            .get(&run_id)
            .ok_or(StrategyError::UnknownRun(run_id))?;
        let snapshot = entry.snapshot.read().clone();
        Ok(snapshot)
    }

    /// Snapshots of every known run, active and finished.
    pub fn runs(&self) -> Vec<RunSnapshot> {
        self.runs
            .iter()
            .map(|entry| entry.snapshot.read().clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.runs
            .iter()
            .filter(|entry| entry.snapshot.read().state == RunState::Running)
            .count()
    }

    /// Wait for a run's task to finish and return its final snapshot.
    pub async fn wait(&self, run_id: RunId) -> StrategyResult<RunSnapshot> {
        let task = {
            let entry = self
                .runs
                .get(&run_id)
                .ok_or(StrategyError::UnknownRun(run_id))?;
            let task = entry.task.lock().take();
            task
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(%run_id, ?e, "Strategy task panicked");
            }
        }
        Metrics::active_runs_set(self.active_count() as i64);
        self.status(run_id)
    }

    /// Cancel every run. Tasks wind down cooperatively.
    pub fn shutdown(&self) {
        info!(runs = self.runs.len(), "Cancelling all strategy runs");
        for entry in self.runs.iter() {
            entry.cancel.cancel();
        }
    }

    fn insert(
        &self,
        run_id: RunId,
        snapshot: SharedSnapshot,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) {
        self.runs.insert(
            run_id,
            RunEntry {
                snapshot,
                cancel,
                task: Mutex::new(Some(task)),
            },
        );
        Metrics::active_runs_set(self.active_count() as i64);
    }
}
