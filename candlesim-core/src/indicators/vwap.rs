//! Window VWAP.
//!
//! Cumulative (typical price * volume) / cumulative volume from the first
//! candle of the supplied window. Recomputed from scratch every refresh, so
//! it is a window VWAP, not a session VWAP.
//! Undefined while cumulative volume is still zero.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Default)]
pub struct Vwap;

impl Vwap {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let mut cumulative_pv = 0.0;
        let mut cumulative_volume = 0.0;
        candles
            .iter()
            .map(|c| {
                cumulative_pv += c.typical_price() * c.volume;
                cumulative_volume += c.volume;
                if cumulative_volume > 0.0 {
                    cumulative_pv / cumulative_volume
                } else {
                    f64::NAN
                }
            })
            .collect()
    }
}
