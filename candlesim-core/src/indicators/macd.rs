//! Moving Average Convergence Divergence (MACD).
//!
//! Fast and slow EMAs of close, each SMA-seeded over its own period.
//! MACD line = fast - slow, defined from index `slow`.
//! Signal line = EMA of the MACD line, seeded by the SMA of the first
//! `signal` MACD values (index `slow + signal - 1`).
//! Histogram = MACD - signal where both exist.
//!
//! `Indicator::compute` yields the MACD line. `points()` yields all three.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::Candle;

/// MACD outputs for one candle. NaN where undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && slow >= 1 && signal >= 1, "MACD periods must be >= 1");
        Self {
            fast,
            slow,
            signal,
            name: format!("macd_{fast}_{slow}_{signal}"),
        }
    }

    pub fn points(&self, candles: &[Candle]) -> Vec<MacdPoint> {
        let n = candles.len();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);

        let mut line = vec![f64::NAN; n];
        for i in self.slow.min(n)..n {
            line[i] = fast[i] - slow[i];
        }

        // The MACD line starts at `slow`; seed the signal EMA over that tail.
        let mut signal = vec![f64::NAN; n];
        if self.slow < n {
            let tail = ema_of_series(&line[self.slow..], self.signal);
            signal[self.slow..].copy_from_slice(&tail);
        }

        (0..n)
            .map(|i| MacdPoint {
                line: line[i],
                signal: signal[i],
                histogram: line[i] - signal[i],
            })
            .collect()
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.slow
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        self.points(candles).into_iter().map(|p| p.line).collect()
    }
}
