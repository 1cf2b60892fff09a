//! Simple Moving Average (SMA) over closes or volumes.
//!
//! Rolling mean over a trailing window of `period` values.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

/// Which candle field the average runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmaSource {
    Close,
    Volume,
}

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    source: SmaSource,
    name: String,
}

impl Sma {
    pub fn new(period: usize, source: SmaSource) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        let prefix = match source {
            SmaSource::Close => "sma",
            SmaSource::Volume => "volume_ma",
        };
        Self {
            period,
            source,
            name: format!("{prefix}_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let values: Vec<f64> = candles
            .iter()
            .map(|c| match self.source {
                SmaSource::Close => c.close,
                SmaSource::Volume => c.volume,
            })
            .collect();
        sma_of_series(&values, self.period)
    }
}

/// Rolling mean over an arbitrary series. Any NaN inside a window makes
/// that window's output NaN.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn sma_3_known_values() {
        let candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Sma::new(3, SmaSource::Close).compute(&candles);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn volume_source() {
        let mut candles = make_candles(&[10.0, 11.0, 12.0]);
        candles[0].volume = 100.0;
        candles[1].volume = 200.0;
        candles[2].volume = 600.0;
        let sma = Sma::new(3, SmaSource::Volume);
        assert_eq!(sma.name(), "volume_ma_3");
        assert_approx(sma.compute(&candles)[2], 300.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_only_poisons_its_windows() {
        let result = sma_of_series(&[1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0], 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.5, DEFAULT_EPSILON);
        assert_approx(result[5], 5.5, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_lookback() {
        assert_eq!(Sma::new(20, SmaSource::Volume).lookback(), 19);
    }
}
