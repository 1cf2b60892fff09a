//! PatternClassifier: candlestick geometry over a three-candle window.
//!
//! Rules are tried strongest first and the first match wins, so a candle
//! carries at most one label.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::Candle;
use crate::indicators::IndicatorFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandlePattern {
    BullishEngulfing,
    BearishEngulfing,
    Hammer,
    ShootingStar,
    MorningStar,
    EveningStar,
    PiercingLine,
    DarkCloud,
    ThreeWhiteSoldiers,
    ThreeBlackCrows,
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    TweezerBottom,
    TweezerTop,
    InvertedHammer,
    HangingMan,
}

/// Which side a pattern votes for in signal scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternBias {
    Bullish,
    Bearish,
    /// Labelled for display but not scored.
    Neutral,
}

impl CandlePattern {
    /// 2 for strong reversal patterns, 1 otherwise.
    pub fn strength(self) -> u8 {
        match self {
            Self::BullishEngulfing
            | Self::BearishEngulfing
            | Self::MorningStar
            | Self::EveningStar
            | Self::ThreeWhiteSoldiers
            | Self::ThreeBlackCrows => 2,
            _ => 1,
        }
    }

    pub fn bias(self) -> PatternBias {
        match self {
            Self::Hammer | Self::BullishEngulfing | Self::MorningStar | Self::PiercingLine => {
                PatternBias::Bullish
            }
            Self::ShootingStar | Self::BearishEngulfing | Self::EveningStar | Self::DarkCloud => {
                PatternBias::Bearish
            }
            _ => PatternBias::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BullishEngulfing => "bullish-engulfing",
            Self::BearishEngulfing => "bearish-engulfing",
            Self::Hammer => "hammer",
            Self::ShootingStar => "shooting-star",
            Self::MorningStar => "morning-star",
            Self::EveningStar => "evening-star",
            Self::PiercingLine => "piercing-line",
            Self::DarkCloud => "dark-cloud",
            Self::ThreeWhiteSoldiers => "three-white-soldiers",
            Self::ThreeBlackCrows => "three-black-crows",
            Self::Doji => "doji",
            Self::DragonflyDoji => "dragonfly-doji",
            Self::GravestoneDoji => "gravestone-doji",
            Self::TweezerBottom => "tweezer-bottom",
            Self::TweezerTop => "tweezer-top",
            Self::InvertedHammer => "inverted-hammer",
            Self::HangingMan => "hanging-man",
        }
    }
}

impl fmt::Display for CandlePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn same_level(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Classify `current` given the two candles before it.
pub fn classify(two_before: &Candle, previous: &Candle, current: &Candle) -> Option<CandlePattern> {
    use CandlePattern::*;

    let body = current.body();
    let range = current.range();
    let body_ratio = if range > 0.0 { body / range } else { 0.0 };
    let upper = current.upper_shadow();
    let lower = current.lower_shadow();

    if current.is_bullish()
        && previous.is_bearish()
        && current.open < previous.close
        && current.close > previous.open
    {
        return Some(BullishEngulfing);
    }
    if current.is_bearish()
        && previous.is_bullish()
        && current.open > previous.close
        && current.close < previous.open
    {
        return Some(BearishEngulfing);
    }

    let long_lower = lower >= 2.0 * body && upper <= body * 0.5;
    let long_upper = upper >= 2.0 * body && lower <= body * 0.5;

    if long_lower && current.is_bullish() && body_ratio > 0.1 {
        return Some(Hammer);
    }
    if long_upper && current.is_bearish() && body_ratio > 0.1 {
        return Some(ShootingStar);
    }

    let small_middle = previous.body() < previous.range() * 0.3;
    if two_before.is_bearish()
        && small_middle
        && current.is_bullish()
        && current.close > two_before.open
    {
        return Some(MorningStar);
    }
    if two_before.is_bullish()
        && small_middle
        && current.is_bearish()
        && current.close < two_before.open
    {
        return Some(EveningStar);
    }

    let prev_mid = (previous.open + previous.close) / 2.0;
    if previous.is_bearish()
        && current.is_bullish()
        && current.open < previous.low
        && current.close > prev_mid
    {
        return Some(PiercingLine);
    }
    if previous.is_bullish()
        && current.is_bearish()
        && current.open > previous.high
        && current.close < prev_mid
    {
        return Some(DarkCloud);
    }

    if two_before.is_bullish()
        && previous.is_bullish()
        && current.is_bullish()
        && current.close > previous.close
        && previous.close > two_before.close
        && current.open > previous.open
        && previous.open > two_before.open
    {
        return Some(ThreeWhiteSoldiers);
    }
    if two_before.is_bearish()
        && previous.is_bearish()
        && current.is_bearish()
        && current.close < previous.close
        && previous.close < two_before.close
        && current.open < previous.open
        && previous.open < two_before.open
    {
        return Some(ThreeBlackCrows);
    }

    if body_ratio < 0.1 && range > 0.0 && (lower > range * 0.4 || upper > range * 0.4) {
        return Some(if lower >= range * 0.9 {
            DragonflyDoji
        } else if upper >= range * 0.9 {
            GravestoneDoji
        } else {
            Doji
        });
    }

    if same_level(previous.low, current.low) && previous.is_bearish() && current.is_bullish() {
        return Some(TweezerBottom);
    }
    if same_level(previous.high, current.high) && previous.is_bullish() && current.is_bearish() {
        return Some(TweezerTop);
    }

    if long_upper && current.is_bullish() {
        return Some(InvertedHammer);
    }
    if long_lower && current.is_bearish() {
        return Some(HangingMan);
    }

    None
}

/// Label every frame from index 2 onward. Frames before that keep no pattern.
pub fn annotate(candles: &[Candle], frames: &mut [IndicatorFrame]) {
    for (i, w) in candles.windows(3).enumerate() {
        let Some(frame) = frames.get_mut(i + 2) else {
            break;
        };
        let pattern = classify(&w[0], &w[1], &w[2]);
        frame.pattern = pattern;
        frame.pattern_strength = pattern.map_or(0, CandlePattern::strength);
    }
}
