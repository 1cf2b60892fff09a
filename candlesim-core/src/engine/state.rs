//! Per-instrument engine state carried from one cycle to the next.

use chrono::{DateTime, Utc};

use crate::domain::{Position, Trade};

/// Everything the position engine mutates.
///
/// One instance per instrument. Never shared between instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    /// At most one open position.
    pub position: Option<Position>,
    /// Append-only trade ledger.
    pub trades: Vec<Trade>,
    pub balance: f64,
    /// Time of the newest candle already replayed. Candles at or before it
    /// are skipped, which makes replaying a batch idempotent.
    pub last_processed_time: Option<DateTime<Utc>>,
}

impl EngineState {
    /// Flat, no trades, balance at `starting_balance`.
    pub fn fresh(starting_balance: f64) -> Self {
        Self {
            position: None,
            trades: Vec::new(),
            balance: starting_balance,
            last_processed_time: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Unrealized P&L of the open position at `mark_price`, in balance units.
    pub fn unrealized_pnl(&self, mark_price: f64, quote_conversion_rate: f64) -> f64 {
        self.position
            .as_ref()
            .map_or(0.0, |p| p.unrealized_pnl(mark_price) * quote_conversion_rate)
    }

    /// Balance plus the value of the open position marked at `mark_price`.
    pub fn equity(&self, mark_price: f64, quote_conversion_rate: f64) -> f64 {
        let locked = self.position.as_ref().map_or(0.0, |p| p.cost_basis);
        self.balance + locked + self.unrealized_pnl(mark_price, quote_conversion_rate)
    }

    /// True if `time` was already replayed.
    pub fn has_processed(&self, time: DateTime<Utc>) -> bool {
        self.last_processed_time.is_some_and(|seen| time <= seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PositionSide;
    use chrono::TimeZone;

    fn long_position() -> Position {
        Position {
            side: PositionSide::Buy,
            entry_price: 100.0,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            size: 10.0,
            stop_loss: 99.6,
            take_profit: 100.8,
            commission_paid: 1.0,
            signal_confidence: 5,
            cost_basis: 1000.0,
            partially_closed: false,
        }
    }

    #[test]
    fn fresh_state_is_flat() {
        let state = EngineState::fresh(25_000.0);
        assert!(state.is_flat());
        assert!(state.trades.is_empty());
        assert_eq!(state.balance, 25_000.0);
        assert_eq!(state.equity(123.0, 1.0), 25_000.0);
    }

    #[test]
    fn equity_marks_open_position() {
        let mut state = EngineState::fresh(24_000.0);
        state.position = Some(long_position());
        assert_eq!(state.unrealized_pnl(102.0, 1.0), 20.0);
        assert_eq!(state.unrealized_pnl(102.0, 2.0), 40.0);
        assert_eq!(state.equity(102.0, 1.0), 25_020.0);
    }

    #[test]
    fn watermark_covers_earlier_times() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 0, 5, 0).unwrap();
        let mut state = EngineState::fresh(1.0);
        assert!(!state.has_processed(t));
        state.last_processed_time = Some(t);
        assert!(state.has_processed(t));
        assert!(state.has_processed(t - chrono::Duration::minutes(1)));
        assert!(!state.has_processed(t + chrono::Duration::minutes(1)));
    }
}
