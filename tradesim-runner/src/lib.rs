//! TradeSim Runner: Monte Carlo batches, performance analysis, reports.
//!
//! This crate builds on `tradesim-core` to provide:
//! - Batch configuration with TOML loading and validation
//! - Monte Carlo sampler: trade bootstrap, price-path bootstrap, cost jitter
//! - Per-run performance metrics with explicit undefined ratios
//! - Batch aggregation into distributions and percentile bands
//! - Structured, fingerprinted batch reports

pub mod analyzer;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod report;
pub mod sampler;

pub use analyzer::{AggregateResult, Distribution, FailureSummary, PerformanceAnalyzer};
pub use config::{AnalyzerConfig, BacktestConfig, BlockMethod, ConfigError, ResampleMode, SamplerConfig};
pub use metrics::{MetricValue, RunMetrics};
pub use report::{BatchReport, RunSummary};
pub use sampler::{MonteCarloSampler, RunVariant, SamplerError, SimulationRun};
