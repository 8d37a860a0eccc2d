//! CSV bar loading: the hand-off format from the external market data feed.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Timestamps are
//! RFC 3339 or plain `YYYY-MM-DD` dates (taken as midnight UTC).

use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tradesim_core::domain::{Bar, BarSeries};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

pub fn load_bars(path: &Path) -> Result<BarSeries> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open bars file {}", path.display()))?;
    read_bars(file).with_context(|| format!("failed to load bars from {}", path.display()))
}

pub fn read_bars<R: Read>(reader: R) -> Result<BarSeries> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (line, row) in csv.deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("bad CSV record {}", line + 1))?;
        bars.push(Bar {
            timestamp: parse_timestamp(&row.timestamp)
                .with_context(|| format!("bad timestamp in record {}", line + 1))?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    if bars.is_empty() {
        bail!("no bars in input");
    }
    Ok(BarSeries::new(bars)?)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is neither RFC 3339 nor YYYY-MM-DD"))?;
    match date.and_hms_opt(0, 0, 0) {
        Some(naive) => Ok(naive.and_utc()),
        None => bail!("'{raw}' has no midnight"),
    }
}
