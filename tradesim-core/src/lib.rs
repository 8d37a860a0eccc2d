//! TradeSim Core: domain types, execution model, ledger and the bar loop.
//!
//! This crate contains everything a single simulation run needs:
//! - Domain types (bars, signals, orders, fills, positions, trades)
//! - Execution model with slippage, commission and zero-volume policy
//! - Ledger with cash/position accounting and realized P&L
//! - Strategy trait plus a few reference strategies
//! - Run state machine, cancellation and timeout control
//! - Deterministic per-run seed derivation for Monte Carlo batches

pub mod domain;
pub mod engine;
pub mod execution;
pub mod ledger;
pub mod rng;
pub mod strategy;
