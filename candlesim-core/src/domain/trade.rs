//! Trade: an immutable record of a completed (or partially completed) position.

use super::position::PositionSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Why a position (or half of it) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "signal")]
    Signal,
    #[serde(rename = "stop loss")]
    StopLoss,
    #[serde(rename = "take profit")]
    TakeProfit,
    #[serde(rename = "partial take profit")]
    PartialTakeProfit,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::StopLoss => "stop loss",
            Self::TakeProfit => "take profit",
            Self::PartialTakeProfit => "partial take profit",
        }
    }

    pub fn is_partial(self) -> bool {
        self == Self::PartialTakeProfit
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signal" => Ok(Self::Signal),
            "stop loss" => Ok(Self::StopLoss),
            "take profit" => Ok(Self::TakeProfit),
            "partial take profit" => Ok(Self::PartialTakeProfit),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

/// A completed round trip. Appended to the ledger and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    #[serde(alias = "type")]
    pub side: PositionSide,
    pub entry_price: f64,
    pub exit_price: f64,
    #[serde(alias = "positionSize")]
    pub size: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub pnl_amount: f64,
    pub pnl_percent: f64,
    pub exit_reason: ExitReason,
    /// Entry commission share plus exit commission.
    pub commissions: f64,
    #[serde(alias = "virtualBalanceAfter")]
    pub balance_after: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl_amount >= 0.0
    }

    /// Holding time in hours.
    pub fn duration_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_milliseconds() as f64 / 3_600_000.0
    }

    /// Holding time in minutes.
    pub fn duration_minutes(&self) -> f64 {
        (self.exit_time - self.entry_time).num_milliseconds() as f64 / 60_000.0
    }

    /// P&L net of all commissions, the trade's effect on the balance.
    pub fn net_pnl(&self) -> f64 {
        self.pnl_amount - self.commissions
    }
}
