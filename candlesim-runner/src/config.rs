//! TOML application configuration.
//!
//! One file per deployment. Every section and every key is optional; missing
//! values take the defaults of `Default`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use candlesim_core::engine::{CycleConfig, EngineConfig, InvalidConfig, RiskConfig};
use candlesim_core::indicators::IndicatorConfig;
use candlesim_core::signals::SignalConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] InvalidConfig),
    #[error("instrument symbol is empty")]
    EmptySymbol,
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("unrecognised timeframe '{0}' (expected e.g. 1m, 15m, 4h, 1d)")]
    Timeframe(String),
}

/// Which market is traded and how much history each fetch returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Candle interval, e.g. `1m`, `5m`, `1h`, `1d`.
    pub timeframe: String,
    /// Candles requested per fetch.
    pub fetch_limit: usize,
    /// Further symbols run side by side with `symbol`, each with its own state.
    pub additional_symbols: Vec<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            timeframe: "1m".into(),
            fetch_limit: 120,
            additional_symbols: Vec::new(),
        }
    }
}

impl InstrumentConfig {
    /// `symbol` followed by `additional_symbols`, duplicates removed.
    pub fn symbols(&self) -> Vec<String> {
        let mut out = vec![self.symbol.clone()];
        for s in &self.additional_symbols {
            if !out.contains(s) {
                out.push(s.clone());
            }
        }
        out
    }

    /// Candle interval in seconds. Unknown suffixes yield `None`.
    pub fn timeframe_secs(&self) -> Option<i64> {
        let tf = self.timeframe.trim();
        let split = tf.find(|c: char| !c.is_ascii_digit())?;
        let (count, unit) = tf.split_at(split);
        let count: i64 = count.parse().ok()?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            _ => return None,
        };
        (count > 0).then_some(count * unit_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between refresh cycles.
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one snapshot file per instrument.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub instrument: InstrumentConfig,
    pub indicators: IndicatorConfig,
    pub signals: SignalConfig,
    pub risk: RiskConfig,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrument.symbols().iter().any(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptySymbol);
        }
        if self.instrument.fetch_limit == 0 {
            return Err(ConfigError::Zero("fetch_limit"));
        }
        if self.instrument.timeframe_secs().is_none() {
            return Err(ConfigError::Timeframe(self.instrument.timeframe.clone()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::Zero("interval_secs"));
        }
        self.cycle_config().validate()?;
        Ok(())
    }

    /// The part of the configuration a refresh cycle reads.
    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            indicators: self.indicators.clone(),
            signals: self.signals.clone(),
            risk: self.risk.clone(),
            engine: self.engine.clone(),
        }
    }
}
