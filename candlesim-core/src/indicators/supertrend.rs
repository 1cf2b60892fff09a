//! Supertrend: ATR-banded trend direction with hysteresis.
//!
//! Inherently sequential: each candle's final bands depend on the previous
//! candle's bands and direction.
//!
//! Lookback: period (first defined where ATR is).
//!
//! `Indicator::compute` yields the active band: lower band (support) when
//! trending up, upper band (resistance) when trending down. The pipeline uses
//! `bands()` to get both bands and the direction.

use super::atr::{true_range, wilder_smooth};
use super::Indicator;
use crate::domain::Candle;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
}

/// Final bands and direction for one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendPoint {
    pub upper: f64,
    pub lower: f64,
    pub direction: TrendDirection,
}

impl SupertrendPoint {
    pub fn active_band(&self) -> f64 {
        match self.direction {
            TrendDirection::Up => self.lower,
            TrendDirection::Down => self.upper,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Supertrend {
    period: usize,
    multiplier: f64,
    name: String,
}

impl Supertrend {
    pub fn new(period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Supertrend period must be >= 1");
        Self {
            period,
            multiplier,
            name: format!("supertrend_{period}_{multiplier}"),
        }
    }

    /// Compute bands from a precomputed ATR series of the same length.
    pub fn bands(&self, candles: &[Candle], atr: &[f64]) -> Vec<Option<SupertrendPoint>> {
        let n = candles.len();
        let mut result: Vec<Option<SupertrendPoint>> = vec![None; n];
        let mut prev: Option<SupertrendPoint> = None;

        for i in 0..n.min(atr.len()) {
            if atr[i].is_nan() {
                continue;
            }
            let candle = &candles[i];
            let hl2 = candle.hl2();
            let basic_upper = hl2 + self.multiplier * atr[i];
            let basic_lower = hl2 - self.multiplier * atr[i];

            let point = match prev {
                None => SupertrendPoint {
                    upper: basic_upper,
                    lower: basic_lower,
                    direction: if candle.close > basic_upper {
                        TrendDirection::Up
                    } else {
                        TrendDirection::Down
                    },
                },
                Some(p) => {
                    // Upper band only tightens while the previous trend was up,
                    // lower band only tightens while it was down.
                    let mut upper = match p.direction {
                        TrendDirection::Up => basic_upper.min(p.upper),
                        TrendDirection::Down => basic_upper,
                    };
                    let mut lower = match p.direction {
                        TrendDirection::Down => basic_lower.max(p.lower),
                        TrendDirection::Up => basic_lower,
                    };

                    let direction = if candle.close > upper {
                        TrendDirection::Up
                    } else if candle.close < lower {
                        TrendDirection::Down
                    } else {
                        match p.direction {
                            TrendDirection::Up => lower = lower.max(p.lower),
                            TrendDirection::Down => upper = upper.min(p.upper),
                        }
                        p.direction
                    };

                    SupertrendPoint {
                        upper,
                        lower,
                        direction,
                    }
                }
            };

            result[i] = Some(point);
            prev = Some(point);
        }

        result
    }
}

impl Indicator for Supertrend {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let atr = wilder_smooth(&true_range(candles), self.period);
        self.bands(candles, &atr)
            .into_iter()
            .map(|p| p.map_or(f64::NAN, |p| p.active_band()))
            .collect()
    }
}
