//! Strategy scheduling: TWAP slicing and grid ladders.
//!
//! Each strategy run is an independent task driven by its own timer or
//! by fill events from the order state tracker. The registry owns the
//! run table and per-run cancellation tokens; cancellation is
//! cooperative and checked before every scheduled action.

pub mod error;
pub mod grid;
pub mod registry;
pub mod run;
pub mod twap;

pub use error::{StrategyError, StrategyResult};
pub use grid::{grid_prices, GridManager, GridParams};
pub use registry::{StrategyContext, StrategyRunRegistry};
pub use run::{RejectPolicy, RunSnapshot, RunState, StrategyKind};
pub use twap::{slice_quantities, TwapParams, TwapScheduler};
