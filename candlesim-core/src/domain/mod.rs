//! Domain types for candlesim

pub mod candle;
pub mod position;
pub mod signal;
pub mod trade;

pub use candle::{Candle, CandleError};
pub use position::{Position, PositionSide};
pub use signal::{Signal, SignalDirection};
pub use trade::{ExitReason, Trade};
