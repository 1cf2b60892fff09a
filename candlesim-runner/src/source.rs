//! Market data sources.
//!
//! The engine never fetches anything itself: a `MarketDataSource` hands the
//! runner a time-ascending candle batch per cycle. Two implementations:
//! - `CsvCandleSource`: one `<SYMBOL>.csv` file per instrument in a directory
//! - `SyntheticSource`: deterministic candles for demos and tests

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use candlesim_core::domain::Candle;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read candles from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("candle CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("candle CSV {}, line {line}: bad time '{value}'", path.display())]
    BadTime {
        path: PathBuf,
        line: usize,
        value: String,
    },
    #[error("no candles for '{symbol}' at or before {now}")]
    NoData { symbol: String, now: DateTime<Utc> },
}

/// Supplier of candle batches.
pub trait MarketDataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Up to `limit` most recent candles of `symbol` with `time <= now`,
    /// ascending by time.
    fn fetch(&self, symbol: &str, limit: usize, now: DateTime<Utc>) -> Result<Vec<Candle>, FetchError>;
}

// ─── CSV files ──────────────────────────────────────────────────────

/// Row of a candle file: `time,open,high,low,close,volume`.
///
/// `time` is RFC 3339 or Unix seconds.
#[derive(Debug, Deserialize)]
struct CandleRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Read every candle of a candle CSV file, in file order.
pub fn read_candle_file(path: &Path) -> Result<Vec<Candle>, FetchError> {
    let file = std::fs::File::open(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut candles = Vec::new();
    for (row, result) in rdr.deserialize::<CandleRow>().enumerate() {
        let r = result.map_err(|source| FetchError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let time = parse_time(&r.time).ok_or_else(|| FetchError::BadTime {
            path: path.to_path_buf(),
            line: row + 2,
            value: r.time.clone(),
        })?;
        candles.push(Candle {
            time,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
        });
    }
    Ok(candles)
}

/// Candles from `<dir>/<SYMBOL>.csv`, or from a single file for every symbol.
#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    location: CsvLocation,
}

#[derive(Debug, Clone)]
enum CsvLocation {
    Directory(PathBuf),
    File(PathBuf),
}

impl CsvCandleSource {
    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            location: CsvLocation::Directory(dir.into()),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: CsvLocation::File(path.into()),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        match &self.location {
            CsvLocation::Directory(dir) => dir.join(format!("{symbol}.csv")),
            CsvLocation::File(path) => path.clone(),
        }
    }
}

impl MarketDataSource for CsvCandleSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(&self, symbol: &str, limit: usize, now: DateTime<Utc>) -> Result<Vec<Candle>, FetchError> {
        let path = self.path_for(symbol);
        let mut candles = read_candle_file(&path)?;
        candles.retain(|c| c.time <= now);
        if candles.is_empty() {
            return Err(FetchError::NoData {
                symbol: symbol.to_string(),
                now,
            });
        }
        let skip = candles.len().saturating_sub(limit);
        debug!(symbol, path = %path.display(), count = candles.len() - skip, "loaded candles");
        Ok(candles.split_off(skip))
    }
}

// ─── Synthetic ──────────────────────────────────────────────────────

/// Deterministic candles for demos and tests.
///
/// Every candle is a pure function of `(symbol, slot)`, where `slot` is the
/// candle's index since the Unix epoch at the configured interval. Repeated
/// fetches therefore agree on every candle they share, and consecutive
/// candles join up (`open == previous close`).
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    interval_secs: i64,
}

impl SyntheticSource {
    pub fn new(interval_secs: i64) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
        }
    }

    /// Base price of a symbol, between 20 and 520.
    fn base_price(symbol: &str) -> f64 {
        let hash = blake3::hash(symbol.as_bytes());
        let bytes: [u8; 8] = hash.as_bytes()[..8].try_into().unwrap_or_default();
        20.0 + (u64::from_le_bytes(bytes) % 500) as f64
    }

    /// Seeded per `(symbol, slot, stream)`; streams keep the close noise
    /// independent of the wick and volume draws.
    fn rng(symbol: &str, slot: i64, stream: u8) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(&slot.to_le_bytes());
        hasher.update(&[stream]);
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    /// Close of `slot`: two slow waves around the base price plus per-candle noise.
    fn close(symbol: &str, slot: i64) -> f64 {
        let base = Self::base_price(symbol);
        let x = slot as f64;
        let wave = 0.04 * (x / 45.0).sin() + 0.015 * (x / 7.3).sin();
        let noise: f64 = Self::rng(symbol, slot, 0).gen_range(-0.002..0.002);
        base * (1.0 + wave + noise)
    }

    pub fn candle(&self, symbol: &str, slot: i64) -> Candle {
        let open = Self::close(symbol, slot - 1);
        let close = Self::close(symbol, slot);
        let mut rng = Self::rng(symbol, slot, 1);
        let wick = open.max(close) * 0.0015;
        Candle {
            time: Utc.timestamp_opt(slot * self.interval_secs, 0).single().unwrap_or_default(),
            open,
            high: open.max(close) + wick * rng.gen_range(0.0..1.0),
            low: open.min(close) - wick * rng.gen_range(0.0..1.0),
            close,
            volume: rng.gen_range(500.0..5_000.0),
        }
    }
}

impl MarketDataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, symbol: &str, limit: usize, now: DateTime<Utc>) -> Result<Vec<Candle>, FetchError> {
        let last = now.timestamp().div_euclid(self.interval_secs);
        let count = i64::try_from(limit).unwrap_or(i64::MAX).min(last + 1);
        if count <= 0 {
            return Err(FetchError::NoData {
                symbol: symbol.to_string(),
                now,
            });
        }
        Ok((last - count + 1..=last).map(|slot| self.candle(symbol, slot)).collect())
    }
}
