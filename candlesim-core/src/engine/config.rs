//! Risk, engine and cycle configuration.
//!
//! Every section deserializes with defaults for missing keys, so a partial
//! TOML table is always valid input. `validate()` catches values the maths
//! cannot work with before any candle is touched.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicators::IndicatorConfig;
use crate::signals::SignalConfig;

/// A configuration value the engine cannot run with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidConfig {
    #[error("{0} must be at least 1")]
    NonPositivePeriod(&'static str),
    #[error("macd_fast ({fast}) must be below macd_slow ({slow})")]
    MacdPeriods { fast: usize, slow: usize },
    #[error("{0} must be positive and finite")]
    NonPositiveValue(&'static str),
    #[error("{0} must be non-negative and finite")]
    NegativeValue(&'static str),
    #[error("rsi_oversold ({oversold}) must be below rsi_overbought ({overbought}), both within 0..=100")]
    RsiThresholds { oversold: f64, overbought: f64 },
    #[error("max_allocation must be within (0, 1], got {0}")]
    Allocation(f64),
}

/// Position sizing, stop/target distances and trading costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    /// Share of the balance committed per entry, in percent.
    pub position_size_percent: f64,
    /// Fraction of notional charged on every entry and exit.
    pub commission_rate: f64,
    /// Tolerance band around the candle range for execution prices.
    pub slippage_rate: f64,
    pub starting_balance: f64,
    /// Multiplies realized P&L from price units into balance units.
    pub quote_conversion_rate: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_percent: 0.40,
            take_profit_percent: 0.80,
            position_size_percent: 10.0,
            commission_rate: 0.001,
            slippage_rate: 0.001,
            starting_balance: 25_000.0,
            quote_conversion_rate: 1.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        for (name, value) in [
            ("stop_loss_percent", self.stop_loss_percent),
            ("take_profit_percent", self.take_profit_percent),
            ("position_size_percent", self.position_size_percent),
            ("starting_balance", self.starting_balance),
            ("quote_conversion_rate", self.quote_conversion_rate),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(InvalidConfig::NonPositiveValue(name));
            }
        }
        for (name, value) in [
            ("commission_rate", self.commission_rate),
            ("slippage_rate", self.slippage_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(InvalidConfig::NegativeValue(name));
            }
        }
        Ok(())
    }
}

/// Replay behaviour of the position engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Signals on candles older than this (against `now`) are ignored.
    /// `None` disables the staleness check.
    pub max_signal_age_secs: Option<i64>,
    /// Upper bound on the balance fraction committed per entry.
    pub max_allocation: f64,
    /// Close half at the first take-profit hit instead of everything.
    pub partial_take_profit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_signal_age_secs: Some(60),
            max_allocation: 0.9,
            partial_take_profit: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(self.max_allocation > 0.0 && self.max_allocation <= 1.0) {
            return Err(InvalidConfig::Allocation(self.max_allocation));
        }
        if matches!(self.max_signal_age_secs, Some(age) if age < 0) {
            return Err(InvalidConfig::NegativeValue("max_signal_age_secs"));
        }
        Ok(())
    }
}

/// Everything one refresh cycle needs. Changed between cycles only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub indicators: IndicatorConfig,
    pub signals: SignalConfig,
    pub risk: RiskConfig,
    pub engine: EngineConfig,
}

impl CycleConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        self.indicators.validate()?;
        self.signals.validate()?;
        self.risk.validate()?;
        self.engine.validate()
    }
}
