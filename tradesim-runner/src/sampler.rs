//! Monte Carlo sampler: fans a strategy out over N independently seeded runs.
//!
//! Every run is a pure function of (bars, strategy, config, base seed, run
//! index). Runs share only read-only inputs, so they execute on the rayon pool
//! without locking; the ordered `collect` is the barrier that waits for every
//! run (or its timeout) before aggregation.

use std::time::{Duration, Instant};

use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradesim_core::domain::{BarSeries, EquityPoint, Position};
use tradesim_core::engine::{
    CancelToken, RunControl, RunResult, RunState, SimulationEngine, TerminationReason,
};
use tradesim_core::rng::RngHierarchy;
use tradesim_core::strategy::Strategy;

use crate::analyzer::PerformanceAnalyzer;
use crate::bootstrap::{resample_trades, synthetic_path};
use crate::config::{BacktestConfig, ConfigError, ResampleMode};
use crate::metrics::RunMetrics;
use crate::report::{BaselineReport, BatchReport, RunSummary, SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("baseline run failed ({kind}); trade bootstrap needs a clean baseline")]
    BaselineFailed { kind: &'static str },
    #[error("trade bootstrap needs at least one baseline trade")]
    NoBaselineTrades,
    #[error("run index {index} is outside a batch of {runs} runs")]
    IndexOutOfRange { index: u64, runs: usize },
}

/// The perturbation one run was simulated under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunVariant {
    TradeBootstrap { trades: usize },
    PriceBootstrap { bars: usize },
    CostJitter {
        slippage_factor: f64,
        commission_factor: f64,
    },
}

/// One Monte Carlo trial. Replayable from `(base_seed, index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub index: u64,
    pub seed: u64,
    pub variant: RunVariant,
    pub result: RunResult,
    pub metrics: RunMetrics,
}

/// Baseline state every run of a batch may read.
struct BatchContext {
    baseline: RunResult,
    /// Annualization for trade-indexed curves: baseline trades per year.
    trades_per_year: f64,
}

#[derive(Debug)]
pub struct MonteCarloSampler {
    config: BacktestConfig,
    engine: SimulationEngine,
    analyzer: PerformanceAnalyzer,
    seeds: RngHierarchy,
    cancel: Option<CancelToken>,
}

impl MonteCarloSampler {
    pub fn new(config: BacktestConfig) -> Result<Self, SamplerError> {
        config.validate()?;
        Ok(Self {
            engine: SimulationEngine::new(config.engine.clone()),
            analyzer: PerformanceAnalyzer::new(config.analyzer.clone()),
            seeds: RngHierarchy::new(config.sampler.base_seed),
            config,
            cancel: None,
        })
    }

    /// Share a cancellation flag with every run of the batch.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the deterministic baseline plus N perturbed runs and aggregate.
    pub fn run<S: Strategy + ?Sized>(
        &self,
        series: &BarSeries,
        strategy: &S,
    ) -> Result<BatchReport, SamplerError> {
        let sampler = &self.config.sampler;
        let started = Instant::now();
        info!(
            "starting {} batch: {} runs, base seed {}, strategy '{}', {} bars",
            sampler.mode.name(),
            sampler.runs,
            sampler.base_seed,
            strategy.name(),
            series.len()
        );

        let context = self.context(series, strategy)?;
        let indices: Vec<u64> = (0..sampler.runs as u64).collect();
        let runs: Vec<SimulationRun> = if sampler.parallel {
            indices
                .par_iter()
                .map(|&index| self.simulate(index, series, strategy, &context))
                .collect()
        } else {
            indices
                .iter()
                .map(|&index| self.simulate(index, series, strategy, &context))
                .collect()
        };

        let report = self.assemble(series, strategy, context, runs)?;
        info!(
            "finished {} batch in {:.2?}: {} included, {} failed",
            sampler.mode.name(),
            started.elapsed(),
            report.aggregate.runs_included,
            report.failures.count
        );
        Ok(report)
    }

    /// Re-simulate a single run of the batch from `(base_seed, index)` alone.
    pub fn replay_run<S: Strategy + ?Sized>(
        &self,
        series: &BarSeries,
        strategy: &S,
        index: u64,
    ) -> Result<SimulationRun, SamplerError> {
        let runs = self.config.sampler.runs;
        if index >= runs as u64 {
            return Err(SamplerError::IndexOutOfRange { index, runs });
        }
        let context = self.context(series, strategy)?;
        Ok(self.simulate(index, series, strategy, &context))
    }

    fn control(&self) -> RunControl {
        RunControl {
            cancel: self.cancel.clone(),
            timeout: self.config.sampler.timeout_ms.map(Duration::from_millis),
        }
    }

    fn context<S: Strategy + ?Sized>(
        &self,
        series: &BarSeries,
        strategy: &S,
    ) -> Result<BatchContext, SamplerError> {
        let baseline = self.engine.run(series, strategy, &self.control());

        if matches!(self.config.sampler.mode, ResampleMode::TradeBootstrap) {
            if let Some(reason) = baseline.termination().filter(|r| r.is_failure()) {
                return Err(SamplerError::BaselineFailed {
                    kind: reason.kind(),
                });
            }
            if baseline.trades.is_empty() {
                return Err(SamplerError::NoBaselineTrades);
            }
        }

        let bars = baseline.bars_processed.max(1) as f64;
        let trades_per_year =
            self.config.analyzer.periods_per_year * baseline.trades.len() as f64 / bars;
        Ok(BatchContext {
            baseline,
            trades_per_year,
        })
    }

    fn simulate<S: Strategy + ?Sized>(
        &self,
        index: u64,
        series: &BarSeries,
        strategy: &S,
        context: &BatchContext,
    ) -> SimulationRun {
        let seed = self.seeds.sub_seed(index);
        let mut rng = self.seeds.rng_for(index);
        let control = self.control();

        let (variant, result, metrics) = match &self.config.sampler.mode {
            ResampleMode::TradeBootstrap => {
                let result = self.trade_bootstrap(&context.baseline, &control, &mut rng);
                let metrics = self
                    .analyzer
                    .run_metrics_with_periods(&result, context.trades_per_year);
                let variant = RunVariant::TradeBootstrap {
                    trades: result.trades.len(),
                };
                (variant, result, metrics)
            }
            ResampleMode::PriceBootstrap { method } => {
                let result = match synthetic_path(series, method, &mut rng) {
                    Ok(path) => self.engine.run(&path, strategy, &control),
                    Err(err) => RunResult::aborted(
                        self.engine.config(),
                        TerminationReason::InvalidSeries {
                            detail: err.to_string(),
                        },
                    ),
                };
                let metrics = self.analyzer.run_metrics(&result);
                (RunVariant::PriceBootstrap { bars: series.len() }, result, metrics)
            }
            ResampleMode::CostJitter {
                slippage_range,
                commission_range,
            } => {
                let slippage_factor = rng.gen_range(slippage_range.0..=slippage_range.1);
                let commission_factor = rng.gen_range(commission_range.0..=commission_range.1);
                let base = self.engine.config();
                let jittered = base.with_execution(
                    base.execution.jittered(slippage_factor, commission_factor),
                );
                let result = SimulationEngine::new(jittered).run(series, strategy, &control);
                let metrics = self.analyzer.run_metrics(&result);
                let variant = RunVariant::CostJitter {
                    slippage_factor,
                    commission_factor,
                };
                (variant, result, metrics)
            }
        };

        SimulationRun {
            index,
            seed,
            variant,
            result,
            metrics,
        }
    }

    /// Equity path from the baseline's net trade P&L, resampled with replacement.
    ///
    /// Slot i of the path keeps the baseline's i-th exit timestamp, so the curve
    /// spans the same calendar as the baseline.
    fn trade_bootstrap(
        &self,
        baseline: &RunResult,
        control: &RunControl,
        rng: &mut StdRng,
    ) -> RunResult {
        let started = Instant::now();
        let config = self.engine.config();
        let instrument = &config.instrument;
        let sampled = resample_trades(&baseline.trades, rng);

        let mut state = RunState::Initialized;
        let mut equity = config.initial_cash;
        let mut realized = 0.0;
        let mut commission = 0.0;
        let mut curve = Vec::with_capacity(sampled.len());
        let mut trades = Vec::with_capacity(sampled.len());
        let mut stop = None;

        for (i, trade) in sampled.into_iter().enumerate() {
            if let Some(reason) = control.check(started, i) {
                stop = Some(reason);
                break;
            }
            if i == 0 {
                let _ = state.start();
            }

            equity = instrument.round_money(equity + trade.net_pnl);
            realized = instrument.round_money(realized + trade.realized_pnl);
            commission = instrument
                .round_money(commission + trade.entry_commission + trade.exit_commission);
            curve.push(EquityPoint {
                timestamp: baseline.trades[i].exit_timestamp,
                equity,
            });
            trades.push(trade);

            if equity <= 0.0 {
                stop = Some(TerminationReason::EquityDepleted {
                    bar_index: i,
                    equity,
                });
                break;
            }
        }

        match stop {
            Some(reason) => {
                warn!("trade bootstrap run terminated early ({})", reason.kind());
                let _ = state.terminate(reason);
            }
            None => {
                // An empty path never left Initialized.
                let _ = state.start();
                let _ = state.complete();
            }
        }

        RunResult {
            state,
            initial_cash: config.initial_cash,
            bars_processed: curve.len(),
            equity_curve: curve,
            trades,
            fills: Vec::new(),
            rejections: Vec::new(),
            final_cash: equity,
            final_position: Position::flat(instrument.symbol.clone()),
            realized_pnl: realized,
            total_commission: commission,
            total_slippage: 0.0,
        }
    }

    fn assemble<S: Strategy + ?Sized>(
        &self,
        series: &BarSeries,
        strategy: &S,
        context: BatchContext,
        runs: Vec<SimulationRun>,
    ) -> Result<BatchReport, SamplerError> {
        let sampler = &self.config.sampler;
        let aggregate = self.analyzer.aggregate(
            &runs,
            self.config.engine.initial_cash,
            sampler.include_timed_out,
        );
        let failures = PerformanceAnalyzer::failures(&runs);
        let summaries = runs
            .iter()
            .map(|run| RunSummary {
                index: run.index,
                seed: run.seed,
                state: run.result.state.name().to_string(),
                termination: run.result.termination().map(|r| r.kind().to_string()),
                included: PerformanceAnalyzer::is_included(run, sampler.include_timed_out),
                metrics: run.metrics.clone(),
            })
            .collect();
        let baseline_metrics = self.analyzer.run_metrics(&context.baseline);

        Ok(BatchReport {
            schema_version: SCHEMA_VERSION,
            fingerprint: self.config.fingerprint()?,
            strategy: strategy.name().to_string(),
            mode: sampler.mode.name().to_string(),
            bar_count: series.len(),
            config: self.config.clone(),
            baseline: BaselineReport {
                result: context.baseline,
                metrics: baseline_metrics,
            },
            aggregate,
            failures,
            summaries,
            runs: if sampler.retain_runs { runs } else { Vec::new() },
        })
    }
}
