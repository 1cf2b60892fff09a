//! IndicatorPipeline: candles in, one `IndicatorFrame` per candle out.
//!
//! Pure and deterministic. Each indicator is one pass over the window; the
//! pipeline only stitches their NaN-as-warmup series into `Option` fields.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::atr::{true_range, wilder_smooth};
use super::ema::ema_of_series;
use super::levels::Levels;
use super::macd::Macd;
use super::rsi::Rsi;
use super::sma::sma_of_series;
use super::supertrend::{Supertrend, TrendDirection};
use super::vwap::Vwap;
use super::{defined, Indicator};
use crate::domain::Candle;
use crate::engine::config::InvalidConfig;
use crate::patterns::CandlePattern;

/// Indicator periods and multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub volume_ma_period: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub support_resistance_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            volume_ma_period: 20,
            ema_fast: 20,
            ema_slow: 50,
            support_resistance_period: 20,
        }
    }
}

impl IndicatorConfig {
    /// First index at which every indicator the signal engine gates on is defined.
    pub fn min_period(&self) -> usize {
        let macd_warmup = self.macd_fast.max(self.macd_slow).max(self.macd_signal);
        self.rsi_period.max(macd_warmup).max(self.supertrend_period)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let periods = [
            ("supertrend_period", self.supertrend_period),
            ("rsi_period", self.rsi_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("volume_ma_period", self.volume_ma_period),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("support_resistance_period", self.support_resistance_period),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(InvalidConfig::NonPositivePeriod(name));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(InvalidConfig::MacdPeriods {
                fast: self.macd_fast,
                slow: self.macd_slow,
            });
        }
        if !(self.supertrend_multiplier.is_finite() && self.supertrend_multiplier > 0.0) {
            return Err(InvalidConfig::NonPositiveValue("supertrend_multiplier"));
        }
        Ok(())
    }
}

/// Derived values for one candle. `None` means not yet defined (warmup).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorFrame {
    pub true_range: Option<f64>,
    pub atr: Option<f64>,
    pub supertrend_upper: Option<f64>,
    pub supertrend_lower: Option<f64>,
    pub supertrend_direction: Option<TrendDirection>,
    pub rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub vwap: Option<f64>,
    pub volume_ma: Option<f64>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    /// Filled by `patterns::annotate`.
    pub pattern: Option<CandlePattern>,
    /// 0 without a pattern, else 1 (weak) or 2 (strong).
    pub pattern_strength: u8,
}

impl IndicatorFrame {
    /// `atr / close`, the volatility ratio the signal engine gates on.
    pub fn atr_ratio(&self, close: f64) -> Option<f64> {
        match self.atr {
            Some(atr) if close > 0.0 => Some(atr / close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorPipeline {
    config: IndicatorConfig,
}

impl IndicatorPipeline {
    pub fn new(config: IndicatorConfig) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn run(&self, candles: &[Candle]) -> Vec<IndicatorFrame> {
        let cfg = &self.config;
        let n = candles.len();

        let tr = true_range(candles);
        let atr = wilder_smooth(&tr, cfg.supertrend_period);
        let supertrend =
            Supertrend::new(cfg.supertrend_period, cfg.supertrend_multiplier).bands(candles, &atr);
        let rsi = Rsi::new(cfg.rsi_period).compute(candles);
        let macd = Macd::new(cfg.macd_fast, cfg.macd_slow, cfg.macd_signal).points(candles);
        let vwap = Vwap::new().compute(candles);
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let volume_ma = sma_of_series(&volumes, cfg.volume_ma_period);
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema_fast = ema_of_series(&closes, cfg.ema_fast);
        let ema_slow = ema_of_series(&closes, cfg.ema_slow);
        let levels = Levels::new(cfg.support_resistance_period).points(candles);

        debug!(candles = n, "indicator pipeline computed");

        (0..n)
            .map(|i| IndicatorFrame {
                true_range: defined(tr[i]),
                atr: defined(atr[i]),
                supertrend_upper: supertrend[i].map(|p| p.upper),
                supertrend_lower: supertrend[i].map(|p| p.lower),
                supertrend_direction: supertrend[i].map(|p| p.direction),
                rsi: defined(rsi[i]),
                macd_line: defined(macd[i].line),
                macd_signal: defined(macd[i].signal),
                macd_histogram: defined(macd[i].histogram),
                vwap: defined(vwap[i]),
                volume_ma: defined(volume_ma[i]),
                ema_fast: defined(ema_fast[i]),
                ema_slow: defined(ema_slow[i]),
                support: levels[i].map(|l| l.support),
                resistance: levels[i].map(|l| l.resistance),
                pattern: None,
                pattern_strength: 0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    fn wave(n: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.05)
            .collect();
        make_candles(&closes)
    }

    #[test]
    fn default_min_period() {
        assert_eq!(IndicatorConfig::default().min_period(), 26);
    }

    #[test]
    fn frames_match_window_length() {
        let pipeline = IndicatorPipeline::new(IndicatorConfig::default()).unwrap();
        let frames = pipeline.run(&wave(120));
        assert_eq!(frames.len(), 120);
        assert!(frames.iter().all(|f| f.pattern.is_none()));
    }

    #[test]
    fn warmup_boundaries() {
        let pipeline = IndicatorPipeline::new(IndicatorConfig::default()).unwrap();
        let frames = pipeline.run(&wave(120));

        assert!(frames[0].true_range.is_none());
        assert!(frames[1].true_range.is_some());
        assert!(frames[9].atr.is_none());
        assert!(frames[10].atr.is_some());
        assert!(frames[10].supertrend_direction.is_some());
        assert!(frames[13].rsi.is_none());
        assert!(frames[14].rsi.is_some());
        assert!(frames[25].macd_line.is_none());
        assert!(frames[26].macd_line.is_some());
        assert!(frames[33].macd_signal.is_none());
        assert!(frames[34].macd_signal.is_some());
        assert!(frames[34].macd_histogram.is_some());
        assert!(frames[0].vwap.is_some());
        assert!(frames[18].volume_ma.is_none());
        assert!(frames[19].volume_ma.is_some());
        assert!(frames[19].ema_fast.is_some());
        assert!(frames[48].ema_slow.is_none());
        assert!(frames[49].ema_slow.is_some());
        assert!(frames[19].support.is_none());
        assert!(frames[20].support.is_some());
    }

    #[test]
    fn validate_rejects_bad_periods() {
        let mut cfg = IndicatorConfig::default();
        cfg.rsi_period = 0;
        assert_eq!(
            cfg.validate(),
            Err(InvalidConfig::NonPositivePeriod("rsi_period"))
        );

        let mut cfg = IndicatorConfig::default();
        cfg.macd_fast = 30;
        assert!(matches!(cfg.validate(), Err(InvalidConfig::MacdPeriods { .. })));
        assert!(IndicatorPipeline::new(cfg).is_err());
    }

    #[test]
    fn atr_ratio_needs_atr() {
        let frame = IndicatorFrame {
            atr: Some(0.5),
            ..Default::default()
        };
        assert_eq!(frame.atr_ratio(100.0), Some(0.005));
        assert_eq!(IndicatorFrame::default().atr_ratio(100.0), None);
    }
}
