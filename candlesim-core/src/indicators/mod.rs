//! Indicator maths over an ordered candle window.
//!
//! Every indicator is a pure function: candle history in, numeric series of
//! the same length out. Warmup positions hold `f64::NAN`. The pipeline turns
//! the NaN series into one `IndicatorFrame` of `Option<f64>` per candle.
//!
//! Multi-output indicators (Supertrend, MACD, support/resistance) expose an
//! extra method returning every output; `Indicator::compute` yields the
//! primary series only.

pub mod atr;
pub mod ema;
pub mod levels;
pub mod macd;
pub mod pipeline;
pub mod rsi;
pub mod sma;
pub mod supertrend;
pub mod vwap;

pub use atr::Atr;
pub use ema::Ema;
pub use levels::{Levels, LevelsPoint};
pub use macd::{Macd, MacdPoint};
pub use pipeline::{IndicatorConfig, IndicatorFrame, IndicatorPipeline};
pub use rsi::Rsi;
pub use sma::{Sma, SmaSource};
pub use supertrend::{Supertrend, SupertrendPoint, TrendDirection};
pub use vwap::Vwap;

use crate::domain::Candle;

/// Trait for indicators.
///
/// Output has the same length as the input. The first `lookback()` values
/// are `f64::NAN`.
///
/// No value at index t may depend on candles after t: computing over a
/// truncated window must reproduce the prefix of the full computation.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "rsi_14", "atr_10").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle window.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Convert a NaN-as-warmup value into an `Option`.
pub(crate) fn defined(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Synthetic candles from close prices, one minute apart.
///
/// open = previous close (or close for the first candle),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    let data: Vec<(f64, f64, f64, f64)> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            (open, open.max(close) + 1.0, open.min(close) - 1.0, close)
        })
        .collect();
    make_ohlc_candles(&data)
}

/// Synthetic candles from explicit `(open, high, low, close)` tuples, one
/// minute apart, volume = 1000.
#[cfg(test)]
pub fn make_ohlc_candles(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    use chrono::TimeZone;
    let base = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            time: base + chrono::Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
