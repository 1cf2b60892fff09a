//! What the position engine did with each candle.
//!
//! Every balance mutation is an event carrying its `balance_delta`, so the
//! balance can be audited as `starting_balance + Σ balance_delta`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::{PositionSide, Trade};

/// A business-rule violation. The operation is skipped and state is left as
/// it was; reported as an event, never returned as an error.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rejection {
    #[error("price {price} outside tolerance band [{min}, {max}]")]
    PriceOutsideTolerance { price: f64, min: f64, max: f64 },
    #[error("computed position size {size} is not positive")]
    NonPositiveSize { size: f64 },
    #[error("candle time {time} does not follow {previous}")]
    TimeNotIncreasing {
        previous: DateTime<Utc>,
        time: DateTime<Utc>,
    },
}

/// Why a signal was seen but not acted on. Not a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum IgnoreReason {
    /// Candle older than the staleness window.
    Stale { age_secs: i64 },
    /// Opposite-side signal without higher confidence than the open position.
    NotStrongerThanPosition { confidence: u32, held: u32 },
    /// Same-side signal that does not qualify as an add.
    AddNotQualified { confidence: u32, held: u32, in_profit: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    Opened {
        time: DateTime<Utc>,
        side: PositionSide,
        price: f64,
        size: f64,
        commission: f64,
        confidence: u32,
        balance_delta: f64,
    },
    #[serde(rename_all = "camelCase")]
    Added {
        time: DateTime<Utc>,
        side: PositionSide,
        price: f64,
        added_size: f64,
        commission: f64,
        new_entry_price: f64,
        balance_delta: f64,
    },
    /// Full or partial close; `trade.exit_reason` tells which.
    #[serde(rename_all = "camelCase")]
    Closed { trade: Trade, balance_delta: f64 },
    #[serde(rename_all = "camelCase")]
    Ignored {
        time: DateTime<Utc>,
        reason: IgnoreReason,
    },
    #[serde(rename_all = "camelCase")]
    Rejected {
        time: DateTime<Utc>,
        reason: Rejection,
    },
}

impl EngineEvent {
    pub fn balance_delta(&self) -> f64 {
        match self {
            Self::Opened { balance_delta, .. }
            | Self::Added { balance_delta, .. }
            | Self::Closed { balance_delta, .. } => *balance_delta,
            Self::Ignored { .. } | Self::Rejected { .. } => 0.0,
        }
    }

    pub fn trade(&self) -> Option<&Trade> {
        match self {
            Self::Closed { trade, .. } => Some(trade),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn non_mutating_events_have_zero_delta() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let ignored = EngineEvent::Ignored {
            time,
            reason: IgnoreReason::Stale { age_secs: 120 },
        };
        let rejected = EngineEvent::Rejected {
            time,
            reason: Rejection::NonPositiveSize { size: 0.0 },
        };
        assert_eq!(ignored.balance_delta(), 0.0);
        assert_eq!(rejected.balance_delta(), 0.0);
        assert!(rejected.is_rejection());
        assert!(ignored.trade().is_none());
    }

    #[test]
    fn rejection_messages() {
        let r = Rejection::PriceOutsideTolerance {
            price: 120.0,
            min: 98.9,
            max: 101.1,
        };
        assert_eq!(r.to_string(), "price 120 outside tolerance band [98.9, 101.1]");
    }

    #[test]
    fn serializes_tagged() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let event = EngineEvent::Opened {
            time,
            side: PositionSide::Sell,
            price: 100.0,
            size: 25.0,
            commission: 2.5,
            confidence: 6,
            balance_delta: -2502.5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "opened");
        assert_eq!(json["side"], "sell");
        assert_eq!(json["balanceDelta"], -2502.5);
    }
}
