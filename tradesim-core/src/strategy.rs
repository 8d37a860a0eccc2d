//! Strategy contract and reference strategies.
//!
//! A strategy sees the bar history up to and including the current bar and the
//! current position, and answers with a [`Signal`]. It cannot reach the ledger
//! or the engine: `on_bar` takes `&self` and returns a value.

use thiserror::Error;

use crate::domain::{Bar, Position, Signal};

/// Fatal strategy failure. Ends the run as Terminated-Early.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("strategy '{strategy}' failed: {message}")]
pub struct StrategyError {
    pub strategy: String,
    pub message: String,
}

impl StrategyError {
    pub fn new(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

/// Side-effect-free trading decision function.
///
/// `history` is never empty and its last element is the current bar, so no
/// implementation can look ahead.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn on_bar(&self, history: &[Bar], position: &Position) -> Result<Signal, StrategyError>;
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn on_bar(&self, history: &[Bar], position: &Position) -> Result<Signal, StrategyError> {
        (**self).on_bar(history, position)
    }
}

/// Never trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldStrategy;

impl Strategy for HoldStrategy {
    fn name(&self) -> &str {
        "hold"
    }

    fn on_bar(&self, _history: &[Bar], _position: &Position) -> Result<Signal, StrategyError> {
        Ok(Signal::Hold)
    }
}

/// Commits all cash on the first bar it can and holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuyAndHold;

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn on_bar(&self, _history: &[Bar], position: &Position) -> Result<Signal, StrategyError> {
        if position.is_flat() {
            Ok(Signal::buy_all())
        } else {
            Ok(Signal::Hold)
        }
    }
}

/// Simple moving average crossover on closes.
///
/// Goes long with all cash when the fast SMA crosses above the slow SMA and
/// exits the whole position when it crosses back below.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl MaCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self, StrategyError> {
        if fast_period == 0 || slow_period <= fast_period {
            return Err(StrategyError::new(
                "ma_crossover",
                format!("need 0 < fast ({fast_period}) < slow ({slow_period})"),
            ));
        }
        Ok(Self {
            fast_period,
            slow_period,
        })
    }

    /// SMA of the `period` closes ending at `end` (exclusive).
    fn sma(history: &[Bar], end: usize, period: usize) -> f64 {
        let window = &history[end - period..end];
        window.iter().map(|b| b.close).sum::<f64>() / period as f64
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn on_bar(&self, history: &[Bar], position: &Position) -> Result<Signal, StrategyError> {
        let n = history.len();
        // Need the slow window for both this bar and the previous one.
        if n < self.slow_period + 1 {
            return Ok(Signal::Hold);
        }
        let fast_now = Self::sma(history, n, self.fast_period);
        let slow_now = Self::sma(history, n, self.slow_period);
        let fast_prev = Self::sma(history, n - 1, self.fast_period);
        let slow_prev = Self::sma(history, n - 1, self.slow_period);

        let crossed_up = fast_prev <= slow_prev && fast_now > slow_now;
        let crossed_down = fast_prev >= slow_prev && fast_now < slow_now;

        if crossed_up && position.is_flat() {
            Ok(Signal::buy_all())
        } else if crossed_down && position.is_long() {
            Ok(Signal::sell_all())
        } else {
            Ok(Signal::Hold)
        }
    }
}
