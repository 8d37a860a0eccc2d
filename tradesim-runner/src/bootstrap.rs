//! Resampling primitives for the Monte Carlo sampler.
//!
//! Resamplers return *indices* into the source sequence rather than values so
//! that a price path can carry the intrabar shape and volume of the bar each
//! return came from.

use rand::rngs::StdRng;
use rand::Rng;

use tradesim_core::domain::{Bar, BarError, BarSeries, Trade};

use crate::config::BlockMethod;

/// `target_len` indices drawn uniformly with replacement from `0..n`.
pub fn resample_iid(n: usize, target_len: usize, rng: &mut StdRng) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    (0..target_len).map(|_| rng.gen_range(0..n)).collect()
}

/// Stationary block bootstrap over `0..n`.
///
/// Uses geometric block lengths with parameter p = 1/mean_block_length.
/// At each step: with probability p, start a new random block; otherwise
/// continue the current block (wrapping around).
pub fn resample_stationary_block(
    n: usize,
    target_len: usize,
    mean_block_length: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let p = 1.0 / mean_block_length.max(1) as f64;
    let mut resampled = Vec::with_capacity(target_len);
    let mut pos = rng.gen_range(0..n);

    for _ in 0..target_len {
        resampled.push(pos);
        if rng.gen::<f64>() < p {
            pos = rng.gen_range(0..n);
        } else {
            pos = (pos + 1) % n;
        }
    }

    resampled
}

pub fn resample_indices(
    method: &BlockMethod,
    n: usize,
    target_len: usize,
    rng: &mut StdRng,
) -> Vec<usize> {
    match *method {
        BlockMethod::Iid => resample_iid(n, target_len, rng),
        BlockMethod::StationaryBlock { mean_block_length } => {
            resample_stationary_block(n, target_len, mean_block_length, rng)
        }
    }
}

/// Synthetic bar series of the same length and timestamps as `source`.
///
/// Bar 0 is kept as is. Bar t compounds the previous synthetic close by the
/// sampled close-to-close return; open/high/low keep the source bar's shape
/// relative to its close, and volume is the source bar's volume. High and low
/// are clamped around open and close so rounding never yields an inverted bar.
pub fn synthetic_path(
    source: &BarSeries,
    method: &BlockMethod,
    rng: &mut StdRng,
) -> Result<BarSeries, BarError> {
    let bars = source.bars();
    let returns = source.returns();
    let picks = resample_indices(method, returns.len(), returns.len(), rng);

    let mut path = Vec::with_capacity(bars.len());
    path.push(bars[0].clone());
    for (t, &j) in picks.iter().enumerate() {
        // Return j moves close[j] -> close[j + 1].
        let shape = &bars[j + 1];
        let close = path[t].close * (1.0 + returns[j]);
        let open = close * (shape.open / shape.close);
        let high = (close * (shape.high / shape.close)).max(open).max(close);
        let low = (close * (shape.low / shape.close)).min(open).min(close);
        path.push(Bar {
            timestamp: bars[t + 1].timestamp,
            open,
            high,
            low,
            close,
            volume: shape.volume,
        });
    }
    BarSeries::new(path)
}

/// Trades drawn with replacement from the baseline trade list.
pub fn resample_trades(trades: &[Trade], rng: &mut StdRng) -> Vec<Trade> {
    resample_iid(trades.len(), trades.len(), rng)
        .into_iter()
        .map(|i| trades[i].clone())
        .collect()
}
