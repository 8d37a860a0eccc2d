//! Structured batch report handed to external reporting/visualization.

use serde::{Deserialize, Serialize};
use tradesim_core::engine::RunResult;

use crate::analyzer::{AggregateResult, FailureSummary};
use crate::config::{BacktestConfig, ConfigFingerprint};
use crate::metrics::RunMetrics;
use crate::sampler::SimulationRun;

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

/// The deterministic run on the original series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReport {
    pub result: RunResult,
    pub metrics: RunMetrics,
}

/// Per-run line kept even when full runs are discarded after aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub index: u64,
    pub seed: u64,
    pub state: String,
    pub termination: Option<String>,
    pub included: bool,
    pub metrics: RunMetrics,
}

/// Complete result of one Monte Carlo batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub fingerprint: ConfigFingerprint,
    pub strategy: String,
    pub mode: String,
    pub bar_count: usize,
    pub config: BacktestConfig,
    pub baseline: BaselineReport,
    pub aggregate: AggregateResult,
    pub failures: FailureSummary,
    pub summaries: Vec<RunSummary>,
    /// Full equity curves and trade logs; empty unless `retain_runs`.
    #[serde(default)]
    pub runs: Vec<SimulationRun>,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BatchReport {
    pub fn run(&self, index: u64) -> Option<&SimulationRun> {
        self.runs.iter().find(|run| run.index == index)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
