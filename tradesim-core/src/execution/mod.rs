//! Execution model: slippage, commission, zero-volume policy and the funds/holdings checks.

pub mod cost_model;
pub mod model;

pub use cost_model::{CommissionModel, ExecutionConfig, SlippageModel, ZeroVolumePolicy};
pub use model::{ExecutionModel, OrderRejection};
