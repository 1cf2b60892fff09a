//! One refresh cycle: candles in, new state and a report out.
//!
//! `process_cycle` is pure with respect to its inputs: the caller owns the
//! state and decides whether to keep the returned one. On `Err` nothing was
//! replayed and the caller's state is still the current one.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::{CycleConfig, InvalidConfig};
use super::events::{EngineEvent, Rejection};
use super::position_engine::PositionEngine;
use super::state::EngineState;
use crate::domain::{Candle, CandleError};
use crate::indicators::{IndicatorFrame, IndicatorPipeline};
use crate::patterns;
use crate::performance::{PerformanceSnapshot, PerformanceTracker};
use crate::signals::SignalEngine;

/// Input problems that abandon the whole cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CycleError {
    #[error("invalid configuration: {0}")]
    Config(#[from] InvalidConfig),
    #[error("empty candle batch")]
    EmptyBatch,
    #[error("invalid candle at index {index}: {source}")]
    InvalidCandle {
        index: usize,
        #[source]
        source: CandleError,
    },
}

/// What a cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub events: Vec<EngineEvent>,
    /// Candles replayed through the position engine.
    pub candles_processed: usize,
    /// Candles at or before the watermark, skipped.
    pub candles_already_seen: usize,
    pub signals_fired: usize,
    pub performance: PerformanceSnapshot,
    /// Indicator frame of the newest candle in the window.
    pub latest_frame: Option<IndicatorFrame>,
    /// Close of the newest candle, for marking the open position.
    pub mark_price: Option<f64>,
}

impl CycleReport {
    pub fn trades_closed(&self) -> usize {
        self.events.iter().filter(|e| e.trade().is_some()).count()
    }

    pub fn rejections(&self) -> usize {
        self.events.iter().filter(|e| e.is_rejection()).count()
    }
}

/// Run indicators, patterns and signals over `candles`, then replay every
/// candle newer than the state's watermark through the position engine.
///
/// Candles whose time does not strictly increase within the batch are
/// rejected, reported, and left out of both the indicator window and the replay.
pub fn process_cycle(
    candles: &[Candle],
    config: &CycleConfig,
    state: &EngineState,
    now: DateTime<Utc>,
) -> Result<(EngineState, CycleReport), CycleError> {
    config.validate()?;
    if candles.is_empty() {
        return Err(CycleError::EmptyBatch);
    }
    for (index, candle) in candles.iter().enumerate() {
        candle
            .validate()
            .map_err(|source| CycleError::InvalidCandle { index, source })?;
    }

    let mut report = CycleReport::default();
    let mut window: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match window.last() {
            Some(prev) if candle.time <= prev.time => {
                let reason = Rejection::TimeNotIncreasing {
                    previous: prev.time,
                    time: candle.time,
                };
                warn!(%reason, "candle out of order");
                report.events.push(EngineEvent::Rejected {
                    time: candle.time,
                    reason,
                });
            }
            _ => window.push(candle.clone()),
        }
    }

    let pipeline = IndicatorPipeline::new(config.indicators.clone())?;
    let mut frames = pipeline.run(&window);
    patterns::annotate(&window, &mut frames);
    let signal_engine = SignalEngine::new(config.signals.clone(), config.indicators.min_period())?;
    let signals = signal_engine.detect(&window, &frames);
    let position_engine = PositionEngine::new(config.risk.clone(), config.engine.clone());

    let mut next = state.clone();
    for (candle, signal) in window.iter().zip(&signals) {
        if next.has_processed(candle.time) {
            report.candles_already_seen += 1;
            continue;
        }
        if signal.is_some() {
            report.signals_fired += 1;
        }
        report
            .events
            .extend(position_engine.step(&mut next, candle, signal.as_ref(), now));
        next.last_processed_time = Some(candle.time);
        report.candles_processed += 1;
    }

    report.performance = PerformanceTracker::compute(&next.trades, config.risk.starting_balance);
    report.latest_frame = frames.last().cloned();
    report.mark_price = window.last().map(|c| c.close);

    debug!(
        processed = report.candles_processed,
        already_seen = report.candles_already_seen,
        signals = report.signals_fired,
        events = report.events.len(),
        "cycle complete"
    );
    Ok((next, report))
}
