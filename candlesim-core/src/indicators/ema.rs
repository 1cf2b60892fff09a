//! Exponential Moving Average (EMA) of close prices.
//!
//! EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// SMA-seeded EMA over an arbitrary series.
///
/// Seeds at the first index where `period` values are available. A NaN in
/// the seed window leaves the whole output NaN; a NaN after the seed taints
/// every later value.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let mut sum = 0.0;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let seed = sum / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        if values[i].is_nan() {
            return result;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn single_period_tracks_close() {
        let closes = [42.0, 40.5, 44.25];
        let result = Ema::new(1).compute(&make_candles(&closes));
        for (ema, close) in result.iter().zip(closes) {
            assert_approx(*ema, close, DEFAULT_EPSILON);
        }
    }

    #[test]
    fn period_4_from_sma_seed() {
        // alpha = 0.4, seed = mean(20, 22, 24, 26) = 23
        let result = Ema::new(4).compute(&make_candles(&[20.0, 22.0, 24.0, 26.0, 31.0, 26.0]));
        assert!(result[..3].iter().all(|v| v.is_nan()));
        assert_approx(result[3], 23.0, DEFAULT_EPSILON);
        assert_approx(result[4], 26.2, 1e-9);
        assert_approx(result[5], 26.12, 1e-9);
    }

    #[test]
    fn gap_after_seed_stops_the_series() {
        let result = ema_of_series(&[5.0, 7.0, f64::NAN, 9.0], 2);
        assert_approx(result[1], 6.0, DEFAULT_EPSILON);
        assert!(result[2].is_nan());
        assert!(result[3].is_nan());
    }

    #[test]
    fn gap_in_seed_window_leaves_nothing() {
        assert!(ema_of_series(&[5.0, f64::NAN, 9.0, 9.0], 3).iter().all(|v| v.is_nan()));
        assert!(ema_of_series(&[1.0, 2.0], 3).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn lookback_is_period_minus_one() {
        assert_eq!(Ema::new(50).lookback(), 49);
        assert_eq!(Ema::new(1).lookback(), 0);
    }
}
