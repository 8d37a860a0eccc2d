//! Performance metrics: pure functions that compute run statistics.
//!
//! Every metric is a pure function: equity curve and/or trade list in, value out.
//! Ratios that divide by zero come back as [`MetricValue::Undefined`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tradesim_core::domain::{ExitReason, Trade};
use tradesim_core::engine::RunResult;

/// Standard deviations below this are treated as zero variance.
const VARIANCE_EPSILON: f64 = 1e-15;

/// A ratio that may be undefined (zero trades, zero variance, zero denominator).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    /// `numerator / denominator`, undefined when the denominator is ~0.
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator.abs() < VARIANCE_EPSILON || !denominator.is_finite() {
            MetricValue::Undefined
        } else {
            MetricValue::from_f64(numerator / denominator)
        }
    }

    /// Non-finite values map to Undefined.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            MetricValue::Defined(value)
        } else {
            MetricValue::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match *self {
            MetricValue::Defined(v) => Some(v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

/// Performance metrics for a single simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    /// Annualized standard deviation of per-period returns.
    pub volatility: f64,
    pub sharpe: MetricValue,
    /// Largest peak-to-trough decline as a positive fraction.
    pub max_drawdown: f64,
    pub win_rate: MetricValue,
    pub profit_factor: MetricValue,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: MetricValue,
    pub avg_loss: MetricValue,
    pub avg_bars_held: MetricValue,
    pub max_bars_held: MetricValue,
    pub min_bars_held: MetricValue,
    /// Closed trades per exit reason.
    pub exit_reasons: BTreeMap<ExitReason, usize>,
}

impl RunMetrics {
    /// Compute all metrics for one run.
    ///
    /// `periods_per_year` annualizes per-point returns of the equity curve.
    pub fn compute(result: &RunResult, periods_per_year: f64, risk_free_rate: f64) -> Self {
        let equity = result.equity_values();
        let trades = &result.trades;
        let no_trades = trades.is_empty();
        let returns = period_returns(&equity);

        let winners: Vec<f64> = trades.iter().filter(|t| t.is_winner()).map(|t| t.net_pnl).collect();
        let losers: Vec<f64> = trades.iter().filter(|t| t.net_pnl < 0.0).map(|t| t.net_pnl).collect();
        let held: Vec<f64> = trades.iter().map(|t| t.bars_held() as f64).collect();

        Self {
            final_equity: result.final_equity(),
            total_return: total_return(&equity),
            annualized_return: annualized_return(&equity, periods_per_year),
            volatility: volatility(&returns, periods_per_year),
            sharpe: if no_trades {
                MetricValue::Undefined
            } else {
                sharpe_ratio(&returns, periods_per_year, risk_free_rate)
            },
            max_drawdown: max_drawdown(&equity),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            avg_win: mean_or_undefined(&winners),
            avg_loss: mean_or_undefined(&losers),
            avg_bars_held: mean_or_undefined(&held),
            max_bars_held: extreme_or_undefined(&held, f64::max),
            min_bars_held: extreme_or_undefined(&held, f64::min),
            exit_reasons: exit_reason_counts(trades),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&final_eq)) if initial > 0.0 => (final_eq - initial) / initial,
        _ => 0.0,
    }
}

/// Compound annual growth over the curve's periods.
///
/// A curve that ends at or below zero reports -1 (total loss).
pub fn annualized_return(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    let periods = equity_curve.len().saturating_sub(1);
    if periods == 0 || initial <= 0.0 || periods_per_year <= 0.0 {
        return 0.0;
    }
    if final_eq <= 0.0 {
        return -1.0;
    }
    let years = periods as f64 / periods_per_year;
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized volatility of per-period returns.
pub fn volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    std_dev(returns) * periods_per_year.sqrt()
}

/// Annualized Sharpe ratio.
///
/// Sharpe = mean(returns - rf) / std(returns) * sqrt(periods_per_year).
/// Undefined with fewer than 2 returns or zero variance.
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::Undefined;
    }
    let period_rf = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - period_rf).collect();
    let std = std_dev(&excess);
    if std < VARIANCE_EPSILON {
        return MetricValue::Undefined;
    }
    MetricValue::from_f64(mean_f64(&excess) / std * periods_per_year.sqrt())
}

/// Maximum drawdown as a positive fraction (0.15 = 15% decline from peak).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - eq) / peak);
        }
    }
    max_dd
}

/// Win rate: fraction of trades with positive net P&L.
pub fn win_rate(trades: &[Trade]) -> MetricValue {
    if trades.is_empty() {
        return MetricValue::Undefined;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    MetricValue::Defined(winners as f64 / trades.len() as f64)
}

/// Number of closed trades per exit reason; reasons with no trades are omitted.
pub fn exit_reason_counts(trades: &[Trade]) -> BTreeMap<ExitReason, usize> {
    let mut counts = BTreeMap::new();
    for trade in trades {
        *counts.entry(trade.exit_reason).or_insert(0) += 1;
    }
    counts
}

/// Profit factor: gross profit / gross loss on net P&L.
///
/// Undefined with no trades or no losing trades.
pub fn profit_factor(trades: &[Trade]) -> MetricValue {
    if trades.is_empty() {
        return MetricValue::Undefined;
    }
    let gross_profit: f64 = trades
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();
    MetricValue::ratio(gross_profit, gross_loss)
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple per-period returns from an equity curve.
pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn mean_or_undefined(values: &[f64]) -> MetricValue {
    if values.is_empty() {
        MetricValue::Undefined
    } else {
        MetricValue::from_f64(mean_f64(values))
    }
}

fn extreme_or_undefined(values: &[f64], pick: fn(f64, f64) -> f64) -> MetricValue {
    values
        .iter()
        .copied()
        .reduce(pick)
        .map_or(MetricValue::Undefined, MetricValue::from_f64)
}

/// Percentile of a sorted slice using linear interpolation.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
