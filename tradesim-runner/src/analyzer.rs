//! Performance analyzer: batch aggregation over completed runs.
//!
//! Per-run numbers live in [`RunMetrics`]; this module decides which runs count
//! and summarizes them into distributions and percentile bands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tradesim_core::engine::{RunResult, TerminationReason};

use crate::config::AnalyzerConfig;
use crate::metrics::{mean_f64, percentile_sorted, std_dev, MetricValue, RunMetrics};
use crate::sampler::SimulationRun;

/// One percentile band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentile {
    pub p: f64,
    pub value: f64,
}

/// Summary of one statistic across the included runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Vec<Percentile>,
}

impl Distribution {
    /// `None` for an empty sample.
    pub fn from_values(values: &[f64], percentiles: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Some(Self {
            mean: mean_f64(&sorted),
            std_dev: std_dev(&sorted),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            percentiles: percentiles
                .iter()
                .map(|&p| Percentile {
                    p,
                    value: percentile_sorted(&sorted, p),
                })
                .collect(),
        })
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|band| (band.p - p).abs() < 1e-9)
            .map(|band| band.value)
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }
}

/// Distribution statistics across a Monte Carlo batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub runs_total: usize,
    pub runs_included: usize,
    pub runs_excluded: usize,
    pub final_equity: Option<Distribution>,
    pub total_return: Option<Distribution>,
    pub max_drawdown: Option<Distribution>,
    pub annualized_return: Option<Distribution>,
    pub volatility: Option<Distribution>,
    /// Means over runs where the ratio is defined.
    pub mean_sharpe: MetricValue,
    pub mean_win_rate: MetricValue,
    pub mean_profit_factor: MetricValue,
    /// Share of included runs that finished below initial cash.
    pub probability_of_loss: MetricValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub index: u64,
    pub seed: u64,
    pub reason: TerminationReason,
}

/// Failed runs surfaced in the report. Sibling runs are unaffected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureSummary {
    pub count: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub runs: Vec<FailedRun>,
}

#[derive(Debug, Clone)]
pub struct PerformanceAnalyzer {
    config: AnalyzerConfig,
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn run_metrics(&self, result: &RunResult) -> RunMetrics {
        RunMetrics::compute(result, self.config.periods_per_year, self.config.risk_free_rate)
    }

    /// Metrics for a curve whose points are not bars (e.g. one point per trade).
    pub fn run_metrics_with_periods(
        &self,
        result: &RunResult,
        periods_per_year: f64,
    ) -> RunMetrics {
        RunMetrics::compute(result, periods_per_year, self.config.risk_free_rate)
    }

    /// Whether a run counts toward aggregates.
    ///
    /// Completed and ruined runs count. Failed runs never do, except timeouts
    /// when `include_timed_out` is set.
    pub fn is_included(run: &SimulationRun, include_timed_out: bool) -> bool {
        match run.result.termination() {
            None => true,
            Some(reason) if !reason.is_failure() => true,
            Some(reason) => include_timed_out && reason.is_timeout(),
        }
    }

    pub fn aggregate(
        &self,
        runs: &[SimulationRun],
        initial_cash: f64,
        include_timed_out: bool,
    ) -> AggregateResult {
        let included: Vec<&RunMetrics> = runs
            .iter()
            .filter(|run| Self::is_included(run, include_timed_out))
            .map(|run| &run.metrics)
            .collect();
        let pct = &self.config.percentiles;
        let values_of =
            |f: fn(&RunMetrics) -> f64| -> Vec<f64> { included.iter().map(|m| f(m)).collect() };
        let defined_mean = |f: fn(&RunMetrics) -> MetricValue| -> MetricValue {
            let values: Vec<f64> = included.iter().filter_map(|m| f(m).value()).collect();
            if values.is_empty() {
                MetricValue::Undefined
            } else {
                MetricValue::from_f64(mean_f64(&values))
            }
        };

        let losses = included
            .iter()
            .filter(|m| m.final_equity < initial_cash)
            .count();

        AggregateResult {
            runs_total: runs.len(),
            runs_included: included.len(),
            runs_excluded: runs.len() - included.len(),
            final_equity: Distribution::from_values(&values_of(|m| m.final_equity), pct),
            total_return: Distribution::from_values(&values_of(|m| m.total_return), pct),
            max_drawdown: Distribution::from_values(&values_of(|m| m.max_drawdown), pct),
            annualized_return: Distribution::from_values(&values_of(|m| m.annualized_return), pct),
            volatility: Distribution::from_values(&values_of(|m| m.volatility), pct),
            mean_sharpe: defined_mean(|m| m.sharpe),
            mean_win_rate: defined_mean(|m| m.win_rate),
            mean_profit_factor: defined_mean(|m| m.profit_factor),
            probability_of_loss: MetricValue::ratio(losses as f64, included.len() as f64),
        }
    }

    pub fn failures(runs: &[SimulationRun]) -> FailureSummary {
        let mut summary = FailureSummary::default();
        for run in runs {
            if let Some(reason) = run.result.termination().filter(|r| r.is_failure()) {
                summary.count += 1;
                *summary.by_kind.entry(reason.kind().to_string()).or_insert(0) += 1;
                summary.runs.push(FailedRun {
                    index: run.index,
                    seed: run.seed,
                    reason: reason.clone(),
                });
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::RunVariant;
    use chrono::{Duration, TimeZone, Utc};
    use tradesim_core::domain::{EquityPoint, Position};
    use tradesim_core::engine::{EngineConfig, RunState};

    fn run_with(index: u64, curve: &[f64], state: RunState) -> SimulationRun {
        let base = Utc.with_ymd_and_hms(2024, 1, 2, 21, 0, 0).unwrap();
        let result = RunResult {
            state,
            initial_cash: 100.0,
            equity_curve: curve
                .iter()
                .enumerate()
                .map(|(i, &equity)| EquityPoint {
                    timestamp: base + Duration::days(i as i64),
                    equity,
                })
                .collect(),
            trades: Vec::new(),
            fills: Vec::new(),
            rejections: Vec::new(),
            final_cash: *curve.last().unwrap_or(&100.0),
            final_position: Position::flat("T"),
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_slippage: 0.0,
            bars_processed: curve.len(),
        };
        let analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        SimulationRun {
            index,
            seed: index * 7,
            variant: RunVariant::PriceBootstrap { bars: curve.len() },
            metrics: analyzer.run_metrics(&result),
            result,
        }
    }

    fn timed_out() -> RunState {
        RunState::TerminatedEarly {
            reason: TerminationReason::Timeout {
                bars_processed: 1,
                elapsed_ms: 5,
            },
        }
    }

    #[test]
    fn distribution_percentiles() {
        let values: Vec<f64> = (1..=101).map(f64::from).collect();
        let dist = Distribution::from_values(&values, &[5.0, 50.0, 95.0]).unwrap();
        assert_eq!(dist.median(), Some(51.0));
        assert_eq!(dist.percentile(5.0), Some(6.0));
        assert_eq!(dist.percentile(95.0), Some(96.0));
        assert_eq!(dist.min, 1.0);
        assert_eq!(dist.max, 101.0);
        assert!(Distribution::from_values(&[], &[50.0]).is_none());
    }

    #[test]
    fn failed_runs_excluded_by_default() {
        let runs = vec![
            run_with(0, &[110.0], RunState::Completed),
            run_with(1, &[90.0], RunState::Completed),
            run_with(2, &[10.0], timed_out()),
        ];
        let analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        let agg = analyzer.aggregate(&runs, 100.0, false);
        assert_eq!(agg.runs_included, 2);
        assert_eq!(agg.runs_excluded, 1);
        assert_eq!(agg.final_equity.unwrap().mean, 100.0);
        assert_eq!(agg.probability_of_loss, MetricValue::Defined(0.5));

        let agg = analyzer.aggregate(&runs, 100.0, true);
        assert_eq!(agg.runs_included, 3);
    }

    #[test]
    fn ruined_runs_still_count() {
        let ruined = RunState::TerminatedEarly {
            reason: TerminationReason::EquityDepleted {
                bar_index: 1,
                equity: -5.0,
            },
        };
        let runs = vec![run_with(0, &[50.0, -5.0], ruined)];
        assert!(PerformanceAnalyzer::is_included(&runs[0], false));
        assert_eq!(PerformanceAnalyzer::failures(&runs).count, 0);
    }

    #[test]
    fn failure_summary_groups_by_kind() {
        let cancelled = RunState::TerminatedEarly {
            reason: TerminationReason::Cancelled { bars_processed: 0 },
        };
        let runs = vec![
            run_with(0, &[100.0], RunState::Completed),
            run_with(1, &[100.0], timed_out()),
            run_with(2, &[100.0], timed_out()),
            run_with(3, &[], cancelled),
        ];
        let summary = PerformanceAnalyzer::failures(&runs);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.by_kind.get("timeout"), Some(&2));
        assert_eq!(summary.by_kind.get("cancelled"), Some(&1));
        assert_eq!(summary.runs[0].index, 1);
    }

    #[test]
    fn ratio_means_skip_undefined() {
        // No trades anywhere: every ratio undefined, aggregate stays undefined.
        let runs = vec![run_with(0, &[100.0, 101.0, 99.0], RunState::Completed)];
        let analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        let agg = analyzer.aggregate(&runs, 100.0, false);
        assert_eq!(agg.mean_sharpe, MetricValue::Undefined);
        assert_eq!(agg.mean_win_rate, MetricValue::Undefined);
        assert_eq!(agg.mean_profit_factor, MetricValue::Undefined);
    }

    #[test]
    fn empty_batch_has_no_distributions() {
        let analyzer = PerformanceAnalyzer::new(AnalyzerConfig::default());
        let agg = analyzer.aggregate(&[], EngineConfig::default().initial_cash, false);
        assert!(agg.final_equity.is_none());
        assert_eq!(agg.probability_of_loss, MetricValue::Undefined);
    }
}
