//! Snapshot: the JSON record written after every completed cycle.
//!
//! Field names are camelCase. Trades and the open position also accept the
//! earlier names `type`, `positionSize` and `virtualBalanceAfter` on read;
//! writes always use `side`, `size` and `balanceAfter`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::domain::{Position, Trade};
use crate::engine::EngineState;
use crate::performance::{PerformanceSnapshot, PerformanceTracker};

/// Current snapshot schema version. Snapshots with a higher version are rejected.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Storage key of an instrument's snapshot.
pub fn instrument_key(symbol: &str) -> String {
    format!("tradeData_{symbol}")
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot schema version {found} (max supported: {max})")]
    UnsupportedSchema { found: u32, max: u32 },
    #[error("snapshot belongs to '{found}', expected '{expected}'")]
    InstrumentMismatch { expected: String, found: String },
    #[error("virtual balance {0} is not finite")]
    NonFiniteBalance(f64),
    #[error("open position has invalid size {0}")]
    InvalidPositionSize(f64),
    #[error("trade {index} exits before it enters")]
    TradeTimeReversed { index: usize },
}

/// Persisted state of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub instrument_key: String,
    pub trades: Vec<Trade>,
    pub current_position: Option<Position>,
    pub virtual_balance: f64,
    pub performance_metrics: PerformanceSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_time: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Capture `state` for `symbol`, recomputing the performance block.
    pub fn capture(symbol: &str, state: &EngineState, starting_balance: f64) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            instrument_key: instrument_key(symbol),
            trades: state.trades.clone(),
            current_position: state.position.clone(),
            virtual_balance: state.balance,
            performance_metrics: PerformanceTracker::compute(&state.trades, starting_balance),
            last_processed_time: state.last_processed_time,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version > SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedSchema {
                found: self.schema_version,
                max: SCHEMA_VERSION,
            });
        }
        if !self.virtual_balance.is_finite() {
            return Err(SnapshotError::NonFiniteBalance(self.virtual_balance));
        }
        if let Some(position) = &self.current_position {
            if !(position.size.is_finite() && position.size >= 0.0) {
                return Err(SnapshotError::InvalidPositionSize(position.size));
            }
        }
        if let Some(index) = self.trades.iter().position(|t| t.exit_time < t.entry_time) {
            return Err(SnapshotError::TradeTimeReversed { index });
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate.
    pub fn decode(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Engine state held by this snapshot. The performance block is derived
    /// data and is dropped; the next cycle recomputes it from the trades.
    pub fn into_state(self) -> EngineState {
        EngineState {
            position: self.current_position,
            trades: self.trades,
            balance: self.virtual_balance,
            last_processed_time: self.last_processed_time,
        }
    }
}

/// Restore the state of `symbol` from stored JSON.
///
/// Anything wrong with the stored record (bad JSON, failed validation, a
/// different instrument) is logged and yields a fresh state at `starting_balance`.
pub fn restore_state(json: &str, symbol: &str, starting_balance: f64) -> EngineState {
    let expected = instrument_key(symbol);
    let restored = Snapshot::decode(json).and_then(|snapshot| {
        if snapshot.instrument_key == expected {
            Ok(snapshot)
        } else {
            Err(SnapshotError::InstrumentMismatch {
                expected: expected.clone(),
                found: snapshot.instrument_key,
            })
        }
    });
    match restored {
        Ok(snapshot) => snapshot.into_state(),
        Err(e) => {
            warn!(key = %expected, error = %e, "discarding stored snapshot, starting fresh");
            EngineState::fresh(starting_balance)
        }
    }
}
