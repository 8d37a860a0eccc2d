//! Signal: the only output of a strategy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Share of cash put at risk by [`Signal::buy_risk`].
pub const DEFAULT_RISK_FRACTION: f64 = 0.02;
/// Largest share of cash one position may take under [`Signal::buy_risk`].
pub const DEFAULT_MAX_POSITION_FRACTION: f64 = 0.10;

/// How much to trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderSize {
    /// Absolute number of units.
    Quantity(f64),
    /// Buy: share of available cash to commit. Sell: share of held quantity.
    Fraction(f64),
    /// Buy only. Size so that a move of `stop_distance` (fraction of the
    /// entry price) loses `risk_fraction` of cash, capped so the position
    /// costs at most `max_position_fraction` of cash.
    Risk {
        risk_fraction: f64,
        stop_distance: f64,
        max_position_fraction: f64,
    },
}

/// Trading decision for the current bar.
///
/// A missing size means "everything": a Buy commits all available cash and a
/// Sell closes the whole position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Signal {
    Buy(Option<OrderSize>),
    Sell(Option<OrderSize>),
    #[default]
    Hold,
}

impl Signal {
    pub fn buy_quantity(quantity: f64) -> Self {
        Signal::Buy(Some(OrderSize::Quantity(quantity)))
    }

    pub fn sell_quantity(quantity: f64) -> Self {
        Signal::Sell(Some(OrderSize::Quantity(quantity)))
    }

    /// Risk-sized buy: 2% of cash at risk over `stop_distance`, at most 10% of cash.
    pub fn buy_risk(stop_distance: f64) -> Self {
        Signal::Buy(Some(OrderSize::Risk {
            risk_fraction: DEFAULT_RISK_FRACTION,
            stop_distance,
            max_position_fraction: DEFAULT_MAX_POSITION_FRACTION,
        }))
    }

    pub fn buy_all() -> Self {
        Signal::Buy(None)
    }

    pub fn sell_all() -> Self {
        Signal::Sell(None)
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Signal::Hold)
    }

    /// Reject malformed sizes before they reach the execution model.
    pub fn validate(&self) -> Result<(), SignalError> {
        let size = match self {
            Signal::Sell(Some(OrderSize::Risk { .. })) => return Err(SignalError::RiskSizedSell),
            Signal::Buy(size) | Signal::Sell(size) => size,
            Signal::Hold => return Ok(()),
        };
        match size {
            None => Ok(()),
            Some(OrderSize::Quantity(q)) if q.is_finite() && *q > 0.0 => Ok(()),
            Some(OrderSize::Quantity(q)) => Err(SignalError::InvalidQuantity(*q)),
            Some(OrderSize::Fraction(f)) if f.is_finite() && *f > 0.0 && *f <= 1.0 => Ok(()),
            Some(OrderSize::Fraction(f)) => Err(SignalError::InvalidFraction(*f)),
            Some(OrderSize::Risk {
                risk_fraction,
                stop_distance,
                max_position_fraction,
            }) => {
                let unit = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;
                if !unit(*risk_fraction) {
                    Err(SignalError::InvalidRisk(format!(
                        "risk fraction {risk_fraction} must be in (0, 1]"
                    )))
                } else if !(unit(*stop_distance) && *stop_distance < 1.0) {
                    Err(SignalError::InvalidRisk(format!(
                        "stop distance {stop_distance} must be in (0, 1)"
                    )))
                } else if !unit(*max_position_fraction) {
                    Err(SignalError::InvalidRisk(format!(
                        "max position fraction {max_position_fraction} must be in (0, 1]"
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum SignalError {
    #[error("invalid signal: quantity {0} must be finite and positive")]
    InvalidQuantity(f64),
    #[error("invalid signal: fraction {0} must be in (0, 1]")]
    InvalidFraction(f64),
    #[error("invalid signal: {0}")]
    InvalidRisk(String),
    #[error("invalid signal: risk sizing applies to buys only")]
    RiskSizedSell,
}
