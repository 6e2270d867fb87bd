//! Strategy run lifecycle state.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use strata_core::{ClientOrderId, OrderSide, Qty, RunId, Symbol};
use strata_telemetry::Metrics;
use tracing::info;

/// Which strategy a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Twap,
    Grid,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Twap => "twap",
            StrategyKind::Grid => "grid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Every slice landed and the final one reached a terminal order state.
    Completed,
    /// Finished, but at least one child submission was rejected.
    CompletedWithErrors,
    Cancelled,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::CompletedWithErrors => "completed_with_errors",
            RunState::Cancelled => "cancelled",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a rejected TWAP slice does to the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Log, skip to the next slice, finish `CompletedWithErrors`.
    #[default]
    Continue,
    /// Stop scheduling immediately and mark the run `Failed`.
    Abort,
}

/// Point-in-time view of one strategy run.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub kind: StrategyKind,
    pub symbol: Symbol,
    pub side: OrderSide,
    /// Total quantity for TWAP; levels * qty-per-level for Grid.
    pub target_qty: Qty,
    pub state: RunState,
    /// Tokens of child orders, in submission order. Append-only while
    /// the run is `Running`.
    pub child_orders: Vec<ClientOrderId>,
    /// Child submissions that were definitively rejected.
    pub rejected_children: u32,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

impl RunSnapshot {
    pub fn new(
        run_id: RunId,
        kind: StrategyKind,
        symbol: Symbol,
        side: OrderSide,
        target_qty: Qty,
    ) -> Self {
        Self {
            run_id,
            kind,
            symbol,
            side,
            target_qty,
            state: RunState::Running,
            child_orders: Vec::new(),
            rejected_children: 0,
            created_at: chrono::Utc::now().timestamp_millis(),
            finished_at: None,
        }
    }
}

/// Shared, concurrently-read view of a run. The run's own task is the
/// only writer.
pub type SharedSnapshot = Arc<RwLock<RunSnapshot>>;

/// Move a run into a terminal state (idempotent; first writer wins).
pub(crate) fn finish_run(snapshot: &SharedSnapshot, state: RunState) {
    let mut run = snapshot.write();
    if run.state.is_terminal() {
        return;
    }
    run.state = state;
    run.finished_at = Some(chrono::Utc::now().timestamp_millis());
    info!(run_id = %run.run_id, kind = %run.kind, state = %state,
          children = run.child_orders.len(), rejected = run.rejected_children,
          "Strategy run finished");
    Metrics::run_finished(run.kind.as_str(), state.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_finish_is_idempotent() {
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(RunSnapshot::new(
            RunId::new(),
            StrategyKind::Twap,
            Symbol::new("BTCUSDT"),
            OrderSide::Buy,
            Qty::new(dec!(1)),
        )));

        finish_run(&snapshot, RunState::Cancelled);
        finish_run(&snapshot, RunState::Completed);
        assert_eq!(snapshot.read().state, RunState::Cancelled);
        assert!(snapshot.read().finished_at.is_some());
    }
}
