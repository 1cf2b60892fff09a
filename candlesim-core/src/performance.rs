//! PerformanceTracker: aggregate statistics recomputed from the full ledger.
//!
//! Never updated incrementally: every cycle rebuilds the snapshot from the
//! trade list and the starting balance, so it cannot drift from the ledger.

use serde::{Deserialize, Serialize};

use crate::domain::Trade;

/// Aggregate statistics over a trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of trades with `pnl_amount >= 0`.
    pub win_rate: f64,
    pub total_pnl: f64,
    #[serde(alias = "maxDrawdown")]
    pub max_drawdown_percent: f64,
    /// Gross profit / gross loss. `f64::INFINITY` with profit and no losses.
    #[serde(with = "infinite_f64")]
    pub profit_factor: f64,
    #[serde(alias = "averageTradeDuration")]
    pub average_trade_duration_hours: f64,
}

impl Default for PerformanceSnapshot {
    fn default() -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            max_drawdown_percent: 0.0,
            profit_factor: 0.0,
            average_trade_duration_hours: 0.0,
        }
    }
}

fn sorted_by_entry(trades: &[Trade]) -> Vec<&Trade> {
    let mut sorted: Vec<&Trade> = trades.iter().collect();
    sorted.sort_by_key(|t| t.entry_time);
    sorted
}

/// Equity after each trade, seeded at `starting_balance`, in entry-time order.
///
/// Length is `trades.len() + 1`.
pub fn equity_curve(trades: &[Trade], starting_balance: f64) -> Vec<f64> {
    let mut curve = Vec::with_capacity(trades.len() + 1);
    curve.push(starting_balance);
    let mut equity = starting_balance;
    for trade in sorted_by_entry(trades) {
        equity += trade.pnl_amount;
        curve.push(equity);
    }
    curve
}

/// Largest percentage decline from a running peak.
pub fn max_drawdown_percent(curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &equity in curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak * 100.0);
        }
    }
    worst
}

pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PerformanceTracker;

impl PerformanceTracker {
    pub fn compute(trades: &[Trade], starting_balance: f64) -> PerformanceSnapshot {
        if trades.is_empty() {
            return PerformanceSnapshot::default();
        }

        let mut winning = 0;
        let mut gross_profit = 0.0;
        let mut gross_loss = 0.0;
        for trade in trades {
            if trade.is_winner() {
                winning += 1;
                gross_profit += trade.pnl_amount;
            } else {
                gross_loss += trade.pnl_amount.abs();
            }
        }

        let curve = equity_curve(trades, starting_balance);
        let last = curve.last().copied().unwrap_or(starting_balance);
        let total = trades.len();
        let duration_sum: f64 = trades.iter().map(Trade::duration_hours).sum();

        PerformanceSnapshot {
            total_trades: total,
            winning_trades: winning,
            losing_trades: total - winning,
            win_rate: winning as f64 / total as f64 * 100.0,
            total_pnl: last - starting_balance,
            max_drawdown_percent: max_drawdown_percent(&curve),
            profit_factor: profit_factor(gross_profit, gross_loss),
            average_trade_duration_hours: duration_sum / total as f64,
        }
    }
}

/// JSON has no infinity: write `f64::INFINITY` as the string `"Infinity"`
/// and accept either a number or that string back.
pub mod infinite_f64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match NumberOrText::deserialize(deserializer)? {
            NumberOrText::Number(n) => Ok(n),
            NumberOrText::Text(s) if s == "Infinity" => Ok(f64::INFINITY),
            NumberOrText::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a number or \"Infinity\", got \"{s}\""
            ))),
        }
    }
}
