//! Cost model: slippage and commission policies.
//!
//! Slippage is directional: buyers pay more, sellers receive less.
//! Commission is charged per fill, either flat or as a share of notional.

use serde::{Deserialize, Serialize};

/// Slippage policy, expressed as an adverse fraction of the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageModel {
    /// Constant offset in basis points.
    FixedBps { bps: f64 },
    /// Impact grows with participation: `coefficient * quantity / bar volume`,
    /// capped at `max_fraction`.
    VolumeProportional { coefficient: f64, max_fraction: f64 },
}

impl SlippageModel {
    pub fn none() -> Self {
        SlippageModel::FixedBps { bps: 0.0 }
    }

    /// Adverse price offset as a fraction of the reference price.
    ///
    /// A bar without volume takes the volume model's cap.
    pub fn impact_fraction(&self, quantity: f64, volume: f64) -> f64 {
        match *self {
            SlippageModel::FixedBps { bps } => bps / 10_000.0,
            SlippageModel::VolumeProportional {
                coefficient,
                max_fraction,
            } => {
                if volume <= 0.0 {
                    return max_fraction;
                }
                (coefficient * quantity.abs() / volume).min(max_fraction)
            }
        }
    }

    /// Largest fraction this model can produce for any quantity.
    pub fn worst_case_fraction(&self) -> f64 {
        match *self {
            SlippageModel::FixedBps { bps } => bps / 10_000.0,
            SlippageModel::VolumeProportional { max_fraction, .. } => max_fraction,
        }
    }

    /// Scale the model's intensity (used by cost jitter).
    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            SlippageModel::FixedBps { bps } => SlippageModel::FixedBps { bps: bps * factor },
            SlippageModel::VolumeProportional {
                coefficient,
                max_fraction,
            } => SlippageModel::VolumeProportional {
                coefficient: coefficient * factor,
                max_fraction: max_fraction * factor,
            },
        }
    }
}

/// Commission policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionModel {
    /// Fixed currency amount per fill.
    FlatFee { amount: f64 },
    /// Fraction of fill notional (0.001 = 0.1%).
    PercentOfNotional { rate: f64 },
}

impl CommissionModel {
    pub fn none() -> Self {
        CommissionModel::FlatFee { amount: 0.0 }
    }

    pub fn compute(&self, notional: f64) -> f64 {
        match *self {
            CommissionModel::FlatFee { amount } => amount,
            CommissionModel::PercentOfNotional { rate } => notional.abs() * rate,
        }
    }

    /// Largest quantity whose notional plus commission fits in `budget` at `price`.
    ///
    /// Not lot-rounded; callers round down to the instrument's lot size.
    pub fn max_affordable_quantity(&self, budget: f64, price: f64) -> f64 {
        if price <= 0.0 || budget <= 0.0 {
            return 0.0;
        }
        let qty = match *self {
            CommissionModel::FlatFee { amount } => (budget - amount) / price,
            CommissionModel::PercentOfNotional { rate } => budget / (price * (1.0 + rate)),
        };
        qty.max(0.0)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            CommissionModel::FlatFee { amount } => CommissionModel::FlatFee {
                amount: amount * factor,
            },
            CommissionModel::PercentOfNotional { rate } => {
                CommissionModel::PercentOfNotional { rate: rate * factor }
            }
        }
    }
}

/// What to do when an order lands on a bar that traded no volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVolumePolicy {
    /// Fill at the previous bar's close (the current close on the first bar).
    FillAtPriorClose,
    /// Reject the order.
    Reject,
}

/// Complete execution friction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub slippage: SlippageModel,
    pub commission: CommissionModel,
    pub zero_volume: ZeroVolumePolicy,
}

impl ExecutionConfig {
    pub fn frictionless() -> Self {
        Self {
            slippage: SlippageModel::none(),
            commission: CommissionModel::none(),
            zero_volume: ZeroVolumePolicy::Reject,
        }
    }

    /// Copy with both cost models scaled independently.
    pub fn jittered(&self, slippage_factor: f64, commission_factor: f64) -> Self {
        Self {
            slippage: self.slippage.scaled(slippage_factor),
            commission: self.commission.scaled(commission_factor),
            zero_volume: self.zero_volume,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage: SlippageModel::FixedBps { bps: 5.0 },
            commission: CommissionModel::PercentOfNotional { rate: 0.001 },
            zero_volume: ZeroVolumePolicy::Reject,
        }
    }
}
