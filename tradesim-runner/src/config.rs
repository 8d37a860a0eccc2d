//! Serializable batch configuration.
//!
//! One immutable [`BacktestConfig`] is built before a batch starts and shared
//! by reference with the engine, the sampler and the analyzer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradesim_core::engine::EngineConfig;
use tradesim_core::execution::{CommissionModel, SlippageModel};

/// Content hash identifying a configuration.
pub type ConfigFingerprint = String;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("parse config TOML: {0}")]
    Parse(String),
    #[error("serialize config: {0}")]
    Serialize(String),
}

/// How price paths are resampled for a price-path bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockMethod {
    /// Each return drawn independently with replacement.
    Iid,
    /// Stationary bootstrap: geometric block lengths with this mean.
    StationaryBlock { mean_block_length: usize },
}

/// Perturbation applied to each run of a batch. One mode per batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResampleMode {
    /// Resample the baseline run's trade P&L sequence with replacement.
    #[default]
    TradeBootstrap,
    /// Resample bar returns into synthetic price paths and re-run the strategy.
    PriceBootstrap { method: BlockMethod },
    /// Scale slippage and commission by factors drawn uniformly per run.
    CostJitter {
        slippage_range: (f64, f64),
        commission_range: (f64, f64),
    },
}

impl ResampleMode {
    pub fn name(&self) -> &'static str {
        match self {
            ResampleMode::TradeBootstrap => "trade_bootstrap",
            ResampleMode::PriceBootstrap { .. } => "price_bootstrap",
            ResampleMode::CostJitter { .. } => "cost_jitter",
        }
    }
}

/// Monte Carlo batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of runs N.
    pub runs: usize,
    pub base_seed: u64,
    pub mode: ResampleMode,
    /// Per-run wall-clock budget in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Keep every run's equity curve and trade log in the report.
    pub retain_runs: bool,
    /// Count timed-out runs (with their partial curves) in aggregates.
    pub include_timed_out: bool,
    pub parallel: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            runs: 1000,
            base_seed: 42,
            mode: ResampleMode::default(),
            timeout_ms: None,
            retain_runs: true,
            include_timed_out: false,
            parallel: true,
        }
    }
}

/// Performance analyzer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Annualization factor: bars per year.
    pub periods_per_year: f64,
    /// Annual risk-free rate, spread evenly across periods.
    pub risk_free_rate: f64,
    /// Percentile bands reported across the batch, in [0, 100].
    pub percentiles: Vec<f64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.0,
            percentiles: vec![5.0, 50.0, 95.0],
        }
    }
}

/// Everything needed to reproduce a batch given the bars and the strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub engine: EngineConfig,
    pub sampler: SamplerConfig,
    pub analyzer: AnalyzerConfig,
}

impl BacktestConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// BLAKE3 hash of the canonical JSON form.
    ///
    /// Identical configurations always share a fingerprint, so a report can be
    /// matched to the settings that produced it.
    pub fn fingerprint(&self) -> Result<ConfigFingerprint, ConfigError> {
        let json = serde_json::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;

        let sampler = &self.sampler;
        if sampler.runs == 0 {
            return Err(invalid("sampler.runs must be at least 1"));
        }
        if sampler.timeout_ms == Some(0) {
            return Err(invalid("sampler.timeout_ms must be greater than 0"));
        }
        match &sampler.mode {
            ResampleMode::TradeBootstrap => {}
            ResampleMode::PriceBootstrap { method } => {
                if let BlockMethod::StationaryBlock { mean_block_length } = method {
                    if *mean_block_length == 0 {
                        return Err(invalid("mean_block_length must be at least 1"));
                    }
                }
            }
            ResampleMode::CostJitter {
                slippage_range,
                commission_range,
            } => {
                check_range("slippage_range", *slippage_range)?;
                check_range("commission_range", *commission_range)?;
                let worst = self.engine.execution.slippage.worst_case_fraction();
                if worst * slippage_range.1 >= 1.0 {
                    return Err(invalid("slippage_range scales slippage to 100% of price"));
                }
            }
        }

        let analyzer = &self.analyzer;
        if !(analyzer.periods_per_year.is_finite() && analyzer.periods_per_year > 0.0) {
            return Err(invalid("analyzer.periods_per_year must be positive"));
        }
        if !analyzer.risk_free_rate.is_finite() {
            return Err(invalid("analyzer.risk_free_rate must be finite"));
        }
        if let Some(p) = analyzer
            .percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(invalid(format!("percentile {p} is outside [0, 100]")));
        }
        Ok(())
    }
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if !(engine.initial_cash.is_finite() && engine.initial_cash > 0.0) {
        return Err(invalid("engine.initial_cash must be positive"));
    }
    let instrument = &engine.instrument;
    if !(instrument.tick_size.is_finite() && instrument.tick_size > 0.0) {
        return Err(invalid("instrument.tick_size must be positive"));
    }
    if !(instrument.lot_size.is_finite() && instrument.lot_size > 0.0) {
        return Err(invalid("instrument.lot_size must be positive"));
    }
    match engine.execution.slippage {
        SlippageModel::FixedBps { bps } if !(bps.is_finite() && bps >= 0.0) => {
            return Err(invalid("slippage bps must be non-negative"));
        }
        SlippageModel::VolumeProportional {
            coefficient,
            max_fraction,
        } if !(coefficient >= 0.0 && (0.0..1.0).contains(&max_fraction)) => {
            return Err(invalid(
                "volume slippage needs coefficient >= 0 and max_fraction in [0, 1)",
            ));
        }
        _ => {}
    }
    match engine.execution.commission {
        CommissionModel::FlatFee { amount } if !(amount.is_finite() && amount >= 0.0) => {
            return Err(invalid("flat commission must be non-negative"));
        }
        CommissionModel::PercentOfNotional { rate } if !(0.0..1.0).contains(&rate) => {
            return Err(invalid("commission rate must be in [0, 1)"));
        }
        _ => {}
    }
    if let Some(stop) = engine.exits.stop_loss {
        if !(stop > 0.0 && stop < 1.0) {
            return Err(invalid(format!("exits.stop_loss must be in (0, 1), got {stop}")));
        }
    }
    if let Some(target) = engine.exits.take_profit {
        if !(target.is_finite() && target > 0.0) {
            return Err(invalid(format!("exits.take_profit must be positive, got {target}")));
        }
    }
    Ok(())
}

fn check_range(name: &str, (lo, hi): (f64, f64)) -> Result<(), ConfigError> {
    if !(lo.is_finite() && hi.is_finite()) || lo < 0.0 || lo > hi {
        return Err(invalid(format!(
            "{name} must satisfy 0 <= min <= max, got ({lo}, {hi})"
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue(message.into())
}
