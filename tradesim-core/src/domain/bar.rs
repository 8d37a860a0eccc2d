//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single instrument over one interval.
///
/// Bars are consumed read-only. A series must be strictly increasing in
/// `timestamp`; a fixed interval is not assumed, so gaps are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Basic OHLC sanity check: finite, positive, and high/low bracket open/close.
    pub fn is_sane(&self) -> bool {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
            && self.volume >= 0.0
    }

    pub fn has_volume(&self) -> bool {
        self.volume > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar series is empty")]
    Empty,
    #[error("invalid bar sequence at index {index}: {current} does not follow {previous}")]
    InvalidBarSequence {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("bar {index} at {timestamp} has invalid prices")]
    InvalidPrice {
        index: usize,
        timestamp: DateTime<Utc>,
    },
}

/// Validate a bar series before any run starts.
///
/// Fails on the first non-increasing timestamp or malformed bar.
pub fn validate_series(bars: &[Bar]) -> Result<(), BarError> {
    if bars.is_empty() {
        return Err(BarError::Empty);
    }
    for (index, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(BarError::InvalidPrice {
                index,
                timestamp: bar.timestamp,
            });
        }
        if index > 0 {
            let previous = bars[index - 1].timestamp;
            if bar.timestamp <= previous {
                return Err(BarError::InvalidBarSequence {
                    index,
                    previous,
                    current: bar.timestamp,
                });
            }
        }
    }
    Ok(())
}

/// A validated, strictly time-ordered bar series.
///
/// Construction is the only validation point; the engine trusts it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, BarError> {
        validate_series(&bars)?;
        Ok(Self { bars })
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn returns(&self) -> Vec<f64> {
        close_returns(&self.bars)
    }

    pub fn into_inner(self) -> Vec<Bar> {
        self.bars
    }
}

impl std::ops::Deref for BarSeries {
    type Target = [Bar];

    fn deref(&self) -> &[Bar] {
        &self.bars
    }
}

/// Simple close-to-close returns: `close[t] / close[t-1] - 1` for t >= 1.
pub fn close_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect()
}
