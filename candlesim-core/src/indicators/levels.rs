//! Support / resistance levels.
//!
//! Support = min(low), resistance = max(high) over the trailing `period`
//! candles ending at t. First defined at index `period`.
//!
//! `Indicator::compute` yields support. `points()` yields both levels.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelsPoint {
    pub support: f64,
    pub resistance: f64,
}

#[derive(Debug, Clone)]
pub struct Levels {
    period: usize,
    name: String,
}

impl Levels {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "support/resistance period must be >= 1");
        Self {
            period,
            name: format!("levels_{period}"),
        }
    }

    pub fn points(&self, candles: &[Candle]) -> Vec<Option<LevelsPoint>> {
        let n = candles.len();
        let mut result = vec![None; n];

        for i in self.period..n {
            let window = &candles[i + 1 - self.period..=i];
            let support = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let resistance = window
                .iter()
                .map(|c| c.high)
                .fold(f64::NEG_INFINITY, f64::max);
            if support.is_finite() && resistance.is_finite() {
                result[i] = Some(LevelsPoint {
                    support,
                    resistance,
                });
            }
        }

        result
    }
}

impl Indicator for Levels {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        self.points(candles)
            .into_iter()
            .map(|p| p.map_or(f64::NAN, |p| p.support))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_ohlc_candles;

    #[test]
    fn trailing_min_max() {
        let candles = make_ohlc_candles(&[
            (10.0, 11.0, 9.0, 10.0),
            (10.0, 15.0, 8.0, 12.0),
            (12.0, 13.0, 11.0, 12.0),
            (12.0, 14.0, 10.0, 13.0),
            (13.0, 13.5, 12.5, 13.0),
        ]);
        let points = Levels::new(2).points(&candles);
        assert!(points[0].is_none());
        assert!(points[1].is_none());
        assert_eq!(
            points[2],
            Some(LevelsPoint {
                support: 8.0,
                resistance: 15.0
            })
        );
        // Window [3, 4] no longer sees candle 1
        assert_eq!(
            points[4],
            Some(LevelsPoint {
                support: 10.0,
                resistance: 14.0
            })
        );
    }

    #[test]
    fn levels_lookback() {
        assert_eq!(Levels::new(20).lookback(), 20);
    }
}
