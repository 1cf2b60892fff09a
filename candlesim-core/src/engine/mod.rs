//! Position state machine and the per-cycle replay around it.
//!
//! A cycle runs the indicator pipeline, the pattern classifier and the
//! signal engine over the fetched window, then replays every candle newer
//! than the state's watermark through the `PositionEngine`:
//!
//! 1. Apply the candle's signal (open, flip, add, or ignore)
//! 2. Check the open position's stop-loss, then its take-profit

pub mod config;
pub mod cycle;
pub mod events;
pub mod position_engine;
pub mod state;

pub use config::{CycleConfig, EngineConfig, InvalidConfig, RiskConfig};
pub use cycle::{process_cycle, CycleError, CycleReport};
pub use events::{EngineEvent, IgnoreReason, Rejection};
pub use position_engine::PositionEngine;
pub use state::EngineState;
