//! candlesim runner: everything around the pure cycle.
//!
//! This crate builds on `candlesim-core` to provide:
//! - Market data sources (CSV files, deterministic synthetic candles)
//! - Snapshot stores (JSON files, in-memory)
//! - TOML configuration loading
//! - Per-instrument cycle runner and a parallel multi-instrument driver
//! - Tick sources and an overlap-guarded scheduler

pub mod config;
pub mod instrument;
pub mod scheduler;
pub mod source;
pub mod store;

pub use config::{AppConfig, ConfigError, InstrumentConfig, SchedulerConfig, StorageConfig};
pub use instrument::{run_instruments_parallel, InstrumentRunner, RunError};
pub use scheduler::{
    CycleGuard, CycleTicket, IntervalTicks, ManualTicks, RefreshResults, Scheduler,
    SchedulerStats, TickSource,
};
pub use source::{read_candle_file, CsvCandleSource, FetchError, MarketDataSource, SyntheticSource};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore, StoreError};
