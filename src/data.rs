//! Data loading
//!
//! Loads daily OHLCV bars from CSV files with the column layout
//! `datetime,open,high,low,close,volume`. The loader is the feed
//! boundary, so it enforces the two contracts the engine relies on:
//! every bar is internally valid, and timestamps strictly increase.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;

use crate::types::Candle;

/// Load OHLCV bars from a CSV file.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut candles: Vec<Candle> = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.context(format!("Failed to read row {row}"))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let datetime = parse_datetime(dt_str)
            .context(format!("Failed to parse datetime `{dt_str}` at row {row}"))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context(format!("Failed to parse open at row {row}"))?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context(format!("Failed to parse high at row {row}"))?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context(format!("Failed to parse low at row {row}"))?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context(format!("Failed to parse close at row {row}"))?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context(format!("Failed to parse volume at row {row}"))?;

        let candle = Candle::new(datetime, open, high, low, close, volume)
            .context(format!("Invalid bar at row {row}"))?;

        if let Some(previous) = candles.last() {
            if candle.datetime <= previous.datetime {
                anyhow::bail!(
                    "Bar at row {row} ({}) does not advance past the previous bar ({})",
                    candle.datetime,
                    previous.datetime
                );
            }
        }

        candles.push(candle);
    }

    info!(
        "Loaded {} bars from {}",
        candles.len(),
        path.as_ref().display()
    );
    Ok(candles)
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .or_else(|_| {
            // Bare dates are daily bars stamped at midnight UTC
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|nd| {
                DateTime::<Utc>::from_naive_utc_and_offset(
                    nd.and_hms_opt(0, 0, 0).unwrap_or_default(),
                    Utc,
                )
            })
        })
        .map_err(anyhow::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("turtle-strategy-{name}-{}.csv", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_well_formed_bars() {
        let path = write_temp_csv(
            "ok",
            "datetime,open,high,low,close,volume\n\
             2024-01-02,100.0,105.0,95.0,102.0,10000\n\
             2024-01-03 00:00:00,102.0,108.0,100.0,106.0,12000\n",
        );
        let candles = load_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 102.0);
        assert!(candles[0].datetime < candles[1].datetime);
    }

    #[test]
    fn rejects_out_of_order_rows() {
        let path = write_temp_csv(
            "unordered",
            "datetime,open,high,low,close,volume\n\
             2024-01-03,100.0,105.0,95.0,102.0,10000\n\
             2024-01-02,102.0,108.0,100.0,106.0,12000\n",
        );
        let result = load_csv(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_bars() {
        let path = write_temp_csv(
            "invalid",
            "datetime,open,high,low,close,volume\n\
             2024-01-02,100.0,90.0,95.0,92.0,10000\n",
        );
        let result = load_csv(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
