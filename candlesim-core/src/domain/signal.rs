//! Signal: the directional output of the signal engine for one candle.

use super::position::PositionSide;
use serde::{Deserialize, Serialize};

/// Direction and strength of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalDirection {
    None,
    WeakBuy,
    StrongBuy,
    WeakSell,
    StrongSell,
}

impl SignalDirection {
    pub fn is_buy(self) -> bool {
        matches!(self, Self::WeakBuy | Self::StrongBuy)
    }

    pub fn is_sell(self) -> bool {
        matches!(self, Self::WeakSell | Self::StrongSell)
    }

    pub fn is_strong(self) -> bool {
        matches!(self, Self::StrongBuy | Self::StrongSell)
    }

    /// Side of the position this signal asks for, if any.
    pub fn side(self) -> Option<PositionSide> {
        if self.is_buy() {
            Some(PositionSide::Buy)
        } else if self.is_sell() {
            Some(PositionSide::Sell)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::WeakBuy => "weak-buy",
            Self::StrongBuy => "strong-buy",
            Self::WeakSell => "weak-sell",
            Self::StrongSell => "strong-sell",
        }
    }
}

/// A trading signal. Produced at most once per candle and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub direction: SignalDirection,
    /// Raw weighted score; gates position flips and adds.
    pub confidence: u32,
    /// Price the signal asks to trade at.
    pub reference_price: f64,
    pub source_tag: String,
}

impl Signal {
    pub fn new(direction: SignalDirection, confidence: u32, reference_price: f64) -> Self {
        Self {
            direction,
            confidence,
            reference_price,
            source_tag: format!("weighted-{confidence}"),
        }
    }

    pub fn side(&self) -> Option<PositionSide> {
        self.direction.side()
    }
}
