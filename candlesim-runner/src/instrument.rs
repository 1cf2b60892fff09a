//! Per-instrument runner: fetch, replay, persist.
//!
//! One `InstrumentRunner` owns one instrument's state. Cycles of the same
//! runner never interleave (`run_cycle` takes `&mut self`); separate
//! instruments share nothing mutable.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use candlesim_core::engine::{process_cycle, CycleConfig, CycleError, CycleReport, EngineState};
use candlesim_core::persistence::{instrument_key, restore_state, Snapshot, SnapshotError};

use crate::config::ConfigError;
use crate::source::{FetchError, MarketDataSource};
use crate::store::{SnapshotStore, StoreError};

/// Errors from the runner layer.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("cycle rejected: {0}")]
    Cycle(#[from] CycleError),
    #[error("snapshot store: {0}")]
    Store(#[from] StoreError),
    #[error("snapshot: {0}")]
    Snapshot(#[from] SnapshotError),
}

pub struct InstrumentRunner {
    symbol: String,
    config: CycleConfig,
    fetch_limit: usize,
    source: Arc<dyn MarketDataSource>,
    store: Arc<dyn SnapshotStore>,
    state: EngineState,
    last_report: Option<CycleReport>,
}

impl std::fmt::Debug for InstrumentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRunner")
            .field("symbol", &self.symbol)
            .field("source", &self.source.name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl InstrumentRunner {
    /// Build a runner, restoring the instrument's state from `store`.
    ///
    /// A missing snapshot starts fresh. An unreadable or invalid one is
    /// logged and also starts fresh.
    pub fn new(
        symbol: impl Into<String>,
        config: CycleConfig,
        fetch_limit: usize,
        source: Arc<dyn MarketDataSource>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let symbol = symbol.into();
        let start = config.risk.starting_balance;
        let key = instrument_key(&symbol);
        let state = match store.load(&key) {
            Ok(Some(json)) => restore_state(&json, &symbol, start),
            Ok(None) => EngineState::fresh(start),
            Err(e) => {
                warn!(%key, error = %e, "snapshot unreadable, starting fresh");
                EngineState::fresh(start)
            }
        };
        Self {
            symbol,
            config,
            fetch_limit,
            source,
            store,
            state,
            last_report: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    /// Replace the configuration used from the next cycle on.
    pub fn set_config(&mut self, config: CycleConfig) {
        self.config = config;
    }

    pub fn last_report(&self) -> Option<&CycleReport> {
        self.last_report.as_ref()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.symbol, &self.state, self.config.risk.starting_balance)
    }

    /// Fetch a batch, replay it, then save a snapshot.
    ///
    /// A fetch failure or a rejected batch leaves the state untouched. A save
    /// failure is logged and does not undo the cycle.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<&CycleReport, RunError> {
        let candles = self
            .source
            .fetch(&self.symbol, self.fetch_limit, now)
            .map_err(|e| {
                warn!(symbol = %self.symbol, error = %e, "fetch failed, state unchanged");
                e
            })?;

        let (state, report) =
            process_cycle(&candles, &self.config, &self.state, now).map_err(|e| {
                warn!(symbol = %self.symbol, error = %e, "batch rejected, state unchanged");
                e
            })?;
        self.state = state;

        if !report.events.is_empty() {
            info!(
                symbol = %self.symbol,
                balance = self.state.balance,
                trades = self.state.trades.len(),
                events = report.events.len(),
                closed = report.trades_closed(),
                "cycle applied"
            );
        } else {
            debug!(symbol = %self.symbol, processed = report.candles_processed, "cycle quiet");
        }

        if let Err(e) = self.persist() {
            warn!(symbol = %self.symbol, error = %e, "snapshot not saved");
        }
        Ok(self.last_report.insert(report))
    }

    /// Write the current state to the store.
    pub fn persist(&self) -> Result<(), RunError> {
        let snapshot = self.snapshot();
        let json = snapshot.encode()?;
        self.store.save(&snapshot.instrument_key, &json)?;
        Ok(())
    }
}

/// Run one cycle on every runner in parallel.
///
/// Each runner owns its state, so instruments never contend; results are
/// returned in runner order.
pub fn run_instruments_parallel(
    runners: &mut [InstrumentRunner],
    now: DateTime<Utc>,
) -> Vec<(String, Result<CycleReport, RunError>)> {
    use rayon::prelude::*;

    runners
        .par_iter_mut()
        .map(|runner| {
            let result = runner.run_cycle(now).map(CycleReport::clone);
            (runner.symbol().to_string(), result)
        })
        .collect()
}
