//! candlesim core: candle indicators, pattern classification, signal scoring,
//! and a paper-trading position engine.
//!
//! One refresh cycle per instrument:
//! - Indicators computed over the fetched candle window
//! - Candlestick patterns annotated on each frame
//! - Weighted-confirmation signals scored per candle
//! - Signals replayed through the single-slot position state machine
//! - Performance recomputed from the full trade ledger
//!
//! Persistence is a pair of codecs (JSON snapshot, CSV ledger); storage is
//! left to the caller.

pub mod domain;
pub mod engine;
pub mod indicators;
pub mod patterns;
pub mod performance;
pub mod persistence;
pub mod signals;

pub use domain::{Candle, ExitReason, Position, PositionSide, Signal, SignalDirection, Trade};
pub use engine::{process_cycle, CycleConfig, CycleError, CycleReport, EngineState};
pub use performance::{PerformanceSnapshot, PerformanceTracker};
