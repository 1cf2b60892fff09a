//! candlesim CLI: run cycles, watch instruments, inspect and move ledgers.
//!
//! Commands:
//! - `run`: one cycle over a candle CSV file
//! - `watch`: scheduled cycles for every configured instrument
//! - `report`: performance summary from the saved snapshot
//! - `export-ledger` / `import-ledger`: trade ledger CSV in and out

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use candlesim_core::engine::{CycleReport, EngineEvent, EngineState};
use candlesim_core::persistence::{instrument_key, read_ledger, restore_state, write_ledger, Snapshot};
use candlesim_core::PerformanceSnapshot;
use candlesim_runner::{
    AppConfig, CsvCandleSource, InstrumentRunner, IntervalTicks, JsonFileStore, MarketDataSource,
    RefreshResults, Scheduler, SnapshotStore, SyntheticSource, TickSource,
};

#[derive(Parser)]
#[command(name = "candlesim", about = "candlesim: candle-driven paper trading simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cycle over a candle CSV file.
    Run {
        /// Path to a TOML config file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Candle CSV (time,open,high,low,close,volume).
        #[arg(long)]
        candles: PathBuf,

        /// Cycle time (RFC 3339). Defaults to the current time.
        #[arg(long)]
        now: Option<String>,

        /// Historical replay: turn off the signal staleness check.
        #[arg(long, default_value_t = false)]
        replay: bool,

        /// Print the cycle's events as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run scheduled cycles for every configured instrument.
    Watch {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use deterministic synthetic candles.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Directory of `<SYMBOL>.csv` candle files (when not synthetic).
        #[arg(long)]
        candles_dir: Option<PathBuf>,

        /// Stop after this many ticks. Runs until killed when omitted.
        #[arg(long)]
        ticks: Option<usize>,
    },
    /// Print the performance summary of a saved instrument.
    Report {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instrument symbol. Defaults to the configured symbol.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Write a saved instrument's trade ledger as CSV.
    ExportLedger {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Replace a saved instrument's trade ledger and balance from CSV.
    ImportLedger {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        symbol: Option<String>,

        /// Input CSV path.
        #[arg(long = "in")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("candlesim=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            candles,
            now,
            replay,
            json,
        } => run_once(config.as_deref(), &candles, now.as_deref(), replay, json),
        Commands::Watch {
            config,
            synthetic,
            candles_dir,
            ticks,
        } => run_watch(config.as_deref(), synthetic, candles_dir, ticks),
        Commands::Report { config, symbol } => run_report(config.as_deref(), symbol),
        Commands::ExportLedger {
            config,
            symbol,
            out,
        } => run_export(config.as_deref(), symbol, &out),
        Commands::ImportLedger {
            config,
            symbol,
            input,
        } => run_import(config.as_deref(), symbol, &input),
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(p) => AppConfig::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(AppConfig::default()),
    }
}

fn parse_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("--now '{s}' is not RFC 3339"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Saved state of `symbol`, or a fresh one if nothing was saved.
fn load_state(config: &AppConfig, store: &JsonFileStore, symbol: &str) -> Result<EngineState> {
    let start = config.risk.starting_balance;
    let state = match store.load(&instrument_key(symbol))? {
        Some(json) => restore_state(&json, symbol, start),
        None => EngineState::fresh(start),
    };
    Ok(state)
}

fn run_once(
    config_path: Option<&Path>,
    candles: &Path,
    now: Option<&str>,
    replay: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let now = parse_now(now)?;
    let mut cycle = config.cycle_config();
    if replay {
        cycle.engine.max_signal_age_secs = None;
    }

    let symbol = config.instrument.symbol.clone();
    let source: Arc<dyn MarketDataSource> = Arc::new(CsvCandleSource::file(candles));
    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&config.storage.state_dir));
    // A replay reads the whole file, not just the usual fetch window.
    let limit = if replay { usize::MAX } else { config.instrument.fetch_limit };

    let mut runner = InstrumentRunner::new(symbol, cycle, limit, source, store);
    let report = runner.run_cycle(now)?.clone();

    if json {
        println!("{}", serde_json::to_string_pretty(&report.events)?);
    } else {
        print_cycle(&runner, &report);
    }
    Ok(())
}

fn run_watch(
    config_path: Option<&Path>,
    synthetic: bool,
    candles_dir: Option<PathBuf>,
    ticks: Option<usize>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let source: Arc<dyn MarketDataSource> = match (synthetic, candles_dir) {
        (true, _) => {
            let secs = config.instrument.timeframe_secs().unwrap_or(60);
            Arc::new(SyntheticSource::new(secs))
        }
        (false, Some(dir)) => Arc::new(CsvCandleSource::directory(dir)),
        (false, None) => bail!("watch needs --synthetic or --candles-dir"),
    };
    let store: Arc<dyn SnapshotStore> = Arc::new(JsonFileStore::new(&config.storage.state_dir));

    let runners: Vec<InstrumentRunner> = config
        .instrument
        .symbols()
        .into_iter()
        .map(|symbol| {
            InstrumentRunner::new(
                symbol,
                config.cycle_config(),
                config.instrument.fetch_limit,
                source.clone(),
                store.clone(),
            )
        })
        .collect();
    info!(
        instruments = runners.len(),
        source = source.name(),
        interval_secs = config.scheduler.interval_secs,
        "watching"
    );

    let scheduler = Scheduler::new(runners);
    let mut interval = IntervalTicks::new(Duration::from_secs(config.scheduler.interval_secs));
    if let Some(n) = ticks {
        interval = interval.limit(n);
    }
    let stats = run_scheduler(&scheduler, &mut interval);
    println!(
        "ticks: {}  refreshes: {}  skipped: {}  failures: {}",
        stats.ticks, stats.refreshes, stats.skipped, stats.failures
    );
    Ok(())
}

fn run_scheduler<T: TickSource>(scheduler: &Scheduler, ticks: &mut T) -> candlesim_runner::SchedulerStats {
    let print = |now: DateTime<Utc>, results: &RefreshResults| {
        for (symbol, result) in results {
            match result {
                Ok(report) => println!(
                    "{}  {:<10} new {:>3}  events {:>2}  closed {:>2}  pnl {:>10.2}",
                    now.format("%H:%M:%S"),
                    symbol,
                    report.candles_processed,
                    report.events.len(),
                    report.trades_closed(),
                    report.performance.total_pnl
                ),
                Err(e) => println!("{}  {:<10} error: {e}", now.format("%H:%M:%S"), symbol),
            }
        }
    };
    scheduler.run(ticks, Some(&print))
}

fn run_report(config_path: Option<&Path>, symbol: Option<String>) -> Result<()> {
    let config = load_config(config_path)?;
    let symbol = symbol.unwrap_or_else(|| config.instrument.symbol.clone());
    let store = JsonFileStore::new(&config.storage.state_dir);
    let state = load_state(&config, &store, &symbol)?;
    let snapshot = Snapshot::capture(&symbol, &state, config.risk.starting_balance);

    println!();
    println!("=== {symbol} ===");
    println!("Balance:        {:.2}", state.balance);
    match &state.position {
        Some(pos) => println!(
            "Position:       {} {:.8} @ {:.8} (SL {:.8}, TP {:.8})",
            pos.side.as_str(),
            pos.size,
            pos.entry_price,
            pos.stop_loss,
            pos.take_profit
        ),
        None => println!("Position:       flat"),
    }
    if let Some(t) = state.last_processed_time {
        println!("Last candle:    {t}");
    }
    print_performance(&snapshot.performance_metrics);
    Ok(())
}

fn run_export(config_path: Option<&Path>, symbol: Option<String>, out: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let symbol = symbol.unwrap_or_else(|| config.instrument.symbol.clone());
    let store = JsonFileStore::new(&config.storage.state_dir);
    let state = load_state(&config, &store, &symbol)?;

    let file = std::fs::File::create(out).with_context(|| format!("creating {}", out.display()))?;
    write_ledger(file, &state.trades)?;
    println!("{} trades written to {}", state.trades.len(), out.display());
    Ok(())
}

fn run_import(config_path: Option<&Path>, symbol: Option<String>, input: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let symbol = symbol.unwrap_or_else(|| config.instrument.symbol.clone());
    let store = JsonFileStore::new(&config.storage.state_dir);
    let mut state = load_state(&config, &store, &symbol)?;

    let file = std::fs::File::open(input).with_context(|| format!("opening {}", input.display()))?;
    let import = read_ledger(file)?;
    state.trades = import.trades;
    if let Some(balance) = import.balance {
        state.balance = balance;
    }

    let snapshot = Snapshot::capture(&symbol, &state, config.risk.starting_balance);
    snapshot.validate().context("imported ledger does not form a loadable snapshot")?;
    store.save(&snapshot.instrument_key, &snapshot.encode()?)?;
    println!(
        "{} trades imported ({} rows skipped), balance {:.2}",
        state.trades.len(),
        import.skipped,
        state.balance
    );
    Ok(())
}

fn print_cycle(runner: &InstrumentRunner, report: &CycleReport) {
    let state = runner.state();
    println!();
    println!("=== {} cycle ===", runner.symbol());
    println!(
        "Candles:        {} new, {} already seen",
        report.candles_processed, report.candles_already_seen
    );
    println!("Signals:        {}", report.signals_fired);
    for event in &report.events {
        println!("  {}", describe(event));
    }
    println!("Balance:        {:.2}", state.balance);
    if let (Some(pos), Some(mark)) = (&state.position, report.mark_price) {
        println!(
            "Open:           {} {:.8} @ {:.8}, unrealized {:.2}",
            pos.side.as_str(),
            pos.size,
            pos.entry_price,
            pos.unrealized_pnl(mark)
        );
    }
    print_performance(&report.performance);
}

fn describe(event: &EngineEvent) -> String {
    match event {
        EngineEvent::Opened {
            time,
            side,
            price,
            size,
            confidence,
            ..
        } => format!("{time}  open   {} {size:.8} @ {price:.8} (confidence {confidence})", side.as_str()),
        EngineEvent::Added {
            time,
            side,
            price,
            added_size,
            new_entry_price,
            ..
        } => format!(
            "{time}  add    {} {added_size:.8} @ {price:.8}, entry now {new_entry_price:.8}",
            side.as_str()
        ),
        EngineEvent::Closed { trade, .. } => format!(
            "{}  close  {} {:.8} @ {:.8} ({}), pnl {:.2}",
            trade.exit_time,
            trade.side.as_str(),
            trade.size,
            trade.exit_price,
            trade.exit_reason,
            trade.pnl_amount
        ),
        EngineEvent::Ignored { time, reason } => format!("{time}  ignore {reason:?}"),
        EngineEvent::Rejected { time, reason } => format!("{time}  reject {reason}"),
    }
}

fn print_performance(perf: &PerformanceSnapshot) {
    println!();
    println!("--- Performance ---");
    println!(
        "Trades:         {} ({} won, {} lost)",
        perf.total_trades, perf.winning_trades, perf.losing_trades
    );
    println!("Win Rate:       {:.1}%", perf.win_rate);
    println!("Total P/L:      {:.2}", perf.total_pnl);
    println!("Max Drawdown:   {:.2}%", perf.max_drawdown_percent);
    if perf.profit_factor.is_infinite() {
        println!("Profit Factor:  inf");
    } else {
        println!("Profit Factor:  {:.2}", perf.profit_factor);
    }
    println!("Avg Duration:   {:.2}h", perf.average_trade_duration_hours);
}
