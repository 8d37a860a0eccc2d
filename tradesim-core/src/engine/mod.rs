//! Simulation engine: one deterministic pass of a strategy over a bar series.
//!
//! Each bar runs protective exits, strategy, order sizing, execution and
//! mark-to-market in that order. Cancellation and the wall-clock budget are
//! only observed between bars.

pub mod control;
pub mod loop_runner;
pub mod state;

pub use control::{CancelToken, RunControl};
pub use loop_runner::{run_simulation, SimulationEngine};
pub use state::{
    EngineConfig, ProtectiveExits, RejectedOrder, RunResult, RunState, TerminationReason,
    TransitionError,
};
