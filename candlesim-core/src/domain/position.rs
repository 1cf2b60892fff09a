use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a virtual position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Buy,
    Sell,
}

impl PositionSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// The single open virtual position of an instrument.
///
/// Mutated in place by adds and partial closes; dropped on full close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(alias = "type")]
    pub side: PositionSide,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// Units held, always >= 0.
    #[serde(alias = "positionSize")]
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// Entry commissions not yet attributed to a closed trade.
    pub commission_paid: f64,
    pub signal_confidence: u32,
    /// Notional debited from the balance and not yet returned.
    #[serde(default)]
    pub cost_basis: f64,
    #[serde(default)]
    pub partially_closed: bool,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Buy
    }

    pub fn is_short(&self) -> bool {
        self.side == PositionSide::Sell
    }

    /// Price-only P&L per unit, positive when the position is in profit.
    pub fn favorable_move(&self, price: f64) -> f64 {
        self.side.sign() * (price - self.entry_price)
    }

    pub fn in_profit(&self, price: f64) -> bool {
        self.favorable_move(price) > 0.0
    }

    pub fn unrealized_pnl(&self, mark_price: f64) -> f64 {
        self.size * self.favorable_move(mark_price)
    }
}
