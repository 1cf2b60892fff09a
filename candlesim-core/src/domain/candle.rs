//! Candle: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV candle for one fixed interval of a single instrument.
///
/// Candles are immutable once fetched. Derived values live in a separate
/// `IndicatorFrame` per candle, never on the candle itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Why a candle failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleError {
    #[error("non-finite OHLCV value")]
    NonFinite,
    #[error("high {high} is below low {low}")]
    InvertedRange { high: f64, low: f64 },
    #[error("open/close outside the high-low range")]
    BodyOutsideRange,
    #[error("non-positive price")]
    NonPositivePrice,
    #[error("negative volume {0}")]
    NegativeVolume(f64),
}

impl Candle {
    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Basic OHLCV sanity check: high >= low, body inside the range, prices > 0.
    pub fn validate(&self) -> Result<(), CandleError> {
        if self.is_void() {
            return Err(CandleError::NonFinite);
        }
        if self.high < self.low {
            return Err(CandleError::InvertedRange {
                high: self.high,
                low: self.low,
            });
        }
        if self.open > self.high
            || self.close > self.high
            || self.open < self.low
            || self.close < self.low
        {
            return Err(CandleError::BodyOutsideRange);
        }
        if self.low <= 0.0 {
            return Err(CandleError::NonPositivePrice);
        }
        if self.volume < 0.0 {
            return Err(CandleError::NegativeVolume(self.volume));
        }
        Ok(())
    }

    pub fn is_sane(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Absolute size of the real body.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full high-low range.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    /// Midpoint of the range, `(high + low) / 2`.
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Typical price, `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_candle() -> Candle {
        Candle {
            time: Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle();
        candle.open = f64::NAN;
        assert!(candle.is_void());
        assert_eq!(candle.validate(), Err(CandleError::NonFinite));
    }

    #[test]
    fn candle_detects_inverted_range() {
        let mut candle = sample_candle();
        candle.high = 97.0;
        assert!(matches!(
            candle.validate(),
            Err(CandleError::InvertedRange { .. })
        ));
    }

    #[test]
    fn shadows_and_body() {
        let candle = sample_candle();
        assert_eq!(candle.body(), 3.0);
        assert_eq!(candle.upper_shadow(), 2.0);
        assert_eq!(candle.lower_shadow(), 2.0);
        assert_eq!(candle.range(), 7.0);
        assert!(candle.is_bullish());
    }

    #[test]
    fn candle_serialization_roundtrip() {
        let candle = sample_candle();
        let json = serde_json::to_string(&candle).unwrap();
        let deser: Candle = serde_json::from_str(&json).unwrap();
        assert_eq!(candle, deser);
    }
}
