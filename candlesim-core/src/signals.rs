//! SignalEngine: weighted multi-indicator scoring per candle.
//!
//! Each candle past the warmup gets a bullish and a bearish score from
//! boolean confirmations. A side fires when its score clears the minimum, it
//! has a core confirmation (supertrend or EMA cross on that side) and the
//! candle is volatile enough. The override path fires on supertrend agreement
//! alone with a lower score and half the volatility floor. Bullish is tested
//! first; the core condition is side-specific so both sides never fire.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Signal, SignalDirection};
use crate::engine::config::InvalidConfig;
use crate::indicators::{IndicatorFrame, TrendDirection};
use crate::patterns::PatternBias;

/// Score contribution of each confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub supertrend: u32,
    pub ema_cross: u32,
    pub macd: u32,
    pub rsi: u32,
    pub vwap: u32,
    pub pattern: u32,
    /// Added to both sides: a spike confirms activity, not direction.
    pub volume: u32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            supertrend: 4,
            ema_cross: 2,
            macd: 1,
            rsi: 1,
            vwap: 1,
            pattern: 1,
            volume: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub min_weighted_score: u32,
    /// Scores at or above `min_weighted_score + strong_score_margin` are strong.
    pub strong_score_margin: u32,
    pub min_atr_ratio: f64,
    pub override_min_score: u32,
    /// Fraction of `min_atr_ratio` the override path requires.
    pub override_atr_factor: f64,
    pub volume_spike_factor: f64,
    /// Extra candles skipped after the indicator warmup.
    pub settle_buffer: usize,
    pub weights: SignalWeights,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            min_weighted_score: 4,
            strong_score_margin: 2,
            min_atr_ratio: 0.001,
            override_min_score: 2,
            override_atr_factor: 0.5,
            volume_spike_factor: 1.4,
            settle_buffer: 3,
            weights: SignalWeights::default(),
        }
    }
}

impl SignalConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(0.0..=100.0).contains(&self.rsi_oversold)
            || !(0.0..=100.0).contains(&self.rsi_overbought)
            || self.rsi_oversold >= self.rsi_overbought
        {
            return Err(InvalidConfig::RsiThresholds {
                oversold: self.rsi_oversold,
                overbought: self.rsi_overbought,
            });
        }
        for (name, value) in [
            ("min_atr_ratio", self.min_atr_ratio),
            ("override_atr_factor", self.override_atr_factor),
            ("volume_spike_factor", self.volume_spike_factor),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(InvalidConfig::NegativeValue(name));
            }
        }
        Ok(())
    }

    pub fn strong_threshold(&self) -> u32 {
        self.min_weighted_score + self.strong_score_margin
    }
}

/// Boolean confirmations for one side of one candle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confirmations {
    pub supertrend: bool,
    pub ema_cross: bool,
    pub macd: bool,
    pub rsi: bool,
    pub vwap: bool,
    pub pattern: bool,
    pub volume_spike: bool,
}

impl Confirmations {
    pub fn score(&self, w: &SignalWeights) -> u32 {
        [
            (self.supertrend, w.supertrend),
            (self.ema_cross, w.ema_cross),
            (self.macd, w.macd),
            (self.rsi, w.rsi),
            (self.vwap, w.vwap),
            (self.pattern, w.pattern),
            (self.volume_spike, w.volume),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum()
    }

    pub fn has_core(&self) -> bool {
        self.supertrend || self.ema_cross
    }
}

#[derive(Debug, Clone)]
pub struct SignalEngine {
    config: SignalConfig,
    min_period: usize,
}

impl SignalEngine {
    /// `min_period` comes from `IndicatorConfig::min_period`.
    pub fn new(config: SignalConfig, min_period: usize) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self { config, min_period })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// First index that may carry a signal.
    pub fn first_signal_index(&self) -> usize {
        self.min_period + self.config.settle_buffer
    }

    /// Bullish and bearish confirmations for candle `i`.
    pub fn confirmations(
        &self,
        i: usize,
        candles: &[Candle],
        frames: &[IndicatorFrame],
    ) -> (Confirmations, Confirmations) {
        let cfg = &self.config;
        let candle = &candles[i];
        let frame = &frames[i];
        let prev = i.checked_sub(1).map(|p| &frames[p]);

        let direction = frame.supertrend_direction;
        let rsi = frame.rsi;
        let macd = frame.macd_line.zip(frame.macd_signal);
        let ema = frame.ema_fast.zip(frame.ema_slow);
        let prev_ema = prev.and_then(|p| p.ema_fast.zip(p.ema_slow));
        let spike = frame
            .volume_ma
            .is_some_and(|ma| candle.volume > ma * cfg.volume_spike_factor);
        let bias = frame.pattern.map(|p| p.bias());

        let bull = Confirmations {
            supertrend: direction == Some(TrendDirection::Up),
            ema_cross: matches!((ema, prev_ema), (Some((f, s)), Some((pf, ps))) if f > s && pf <= ps),
            macd: macd.is_some_and(|(line, signal)| line > signal),
            rsi: rsi.is_some_and(|r| r < cfg.rsi_oversold),
            vwap: frame.vwap.is_some_and(|v| candle.close > v),
            pattern: bias == Some(PatternBias::Bullish),
            volume_spike: spike,
        };
        let bear = Confirmations {
            supertrend: direction == Some(TrendDirection::Down),
            ema_cross: matches!((ema, prev_ema), (Some((f, s)), Some((pf, ps))) if f < s && pf >= ps),
            macd: macd.is_some_and(|(line, signal)| line < signal),
            rsi: rsi.is_some_and(|r| r > cfg.rsi_overbought),
            vwap: frame.vwap.is_some_and(|v| candle.close < v),
            pattern: bias == Some(PatternBias::Bearish),
            volume_spike: spike,
        };
        (bull, bear)
    }

    /// Signal for candle `i`, or `None` when nothing fires.
    pub fn evaluate(&self, i: usize, candles: &[Candle], frames: &[IndicatorFrame]) -> Option<Signal> {
        if i < self.first_signal_index() || i >= candles.len() || i >= frames.len() {
            return None;
        }
        let cfg = &self.config;
        let candle = &candles[i];
        let (bull, bear) = self.confirmations(i, candles, frames);
        let bull_score = bull.score(&cfg.weights);
        let bear_score = bear.score(&cfg.weights);
        let atr_ratio = frames[i].atr_ratio(candle.close).unwrap_or(0.0);

        let fires = |side: &Confirmations, score: u32| {
            let weighted =
                score >= cfg.min_weighted_score && side.has_core() && atr_ratio >= cfg.min_atr_ratio;
            let overridden = side.supertrend
                && score >= cfg.override_min_score
                && atr_ratio >= cfg.min_atr_ratio * cfg.override_atr_factor;
            weighted || overridden
        };

        let strong = |score: u32| score >= cfg.strong_threshold();

        if fires(&bull, bull_score) {
            let direction = if strong(bull_score) {
                SignalDirection::StrongBuy
            } else {
                SignalDirection::WeakBuy
            };
            Some(Signal::new(direction, bull_score, candle.high))
        } else if fires(&bear, bear_score) {
            let direction = if strong(bear_score) {
                SignalDirection::StrongSell
            } else {
                SignalDirection::WeakSell
            };
            Some(Signal::new(direction, bear_score, candle.low))
        } else {
            None
        }
    }

    /// One optional signal per candle.
    pub fn detect(&self, candles: &[Candle], frames: &[IndicatorFrame]) -> Vec<Option<Signal>> {
        (0..candles.len().min(frames.len()))
            .map(|i| self.evaluate(i, candles, frames))
            .collect()
    }
}
