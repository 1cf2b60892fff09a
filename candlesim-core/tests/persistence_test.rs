//! Snapshot and ledger codecs against state produced by real cycles.

use candlesim_core::domain::{Candle, ExitReason, PositionSide, Trade};
use candlesim_core::engine::{process_cycle, CycleConfig, EngineState};
use candlesim_core::performance::PerformanceTracker;
use candlesim_core::persistence::{export_ledger, import_ledger, restore_state, Snapshot};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 6, 8, 0, 0).unwrap() + Duration::minutes(minute)
}

fn ledger() -> Vec<Trade> {
    let rows = [
        (PositionSide::Buy, 100.0, 100.8, 25.0, ExitReason::TakeProfit, 0, 14),
        (PositionSide::Sell, 101.2, 101.6048, 24.66, ExitReason::StopLoss, 30, 3),
        (PositionSide::Buy, 99.5, 100.2965, 12.55778894, ExitReason::PartialTakeProfit, 60, 45),
        (PositionSide::Buy, 99.5, 99.9, 12.55778894, ExitReason::Signal, 60, 90),
    ];
    let mut balance = 25_000.0;
    rows.iter()
        .map(|&(side, entry, exit, size, reason, start, held)| {
            let pnl = side.sign() * size * (exit - entry);
            let commissions = size * (entry + exit) * 0.001;
            balance += pnl - commissions;
            Trade {
                side,
                entry_price: entry,
                exit_price: exit,
                size,
                entry_time: t(start),
                exit_time: t(start + held),
                pnl_amount: pnl,
                pnl_percent: pnl / (size * entry) * 100.0,
                exit_reason: reason,
                commissions,
                balance_after: balance,
            }
        })
        .collect()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[test]
fn csv_round_trip_reproduces_trades_and_performance() {
    let trades = ledger();
    let csv = export_ledger(&trades).unwrap();
    let import = import_ledger(&csv).unwrap();

    assert_eq!(import.skipped, 0);
    assert_eq!(import.trades.len(), trades.len());
    for (back, original) in import.trades.iter().zip(&trades) {
        assert_eq!(back.side, original.side);
        assert_eq!(back.exit_reason, original.exit_reason);
        assert_eq!(back.entry_time, original.entry_time);
        assert_eq!(back.exit_time, original.exit_time);
        assert_eq!(back.entry_price, round_to(original.entry_price, 8));
        assert_eq!(back.exit_price, round_to(original.exit_price, 8));
        assert_eq!(back.size, round_to(original.size, 8));
        assert!((back.pnl_amount - original.pnl_amount).abs() <= 0.005 + 1e-9);
        assert!((back.pnl_percent - original.pnl_percent).abs() <= 0.005 + 1e-9);
        assert!((back.commissions - original.commissions).abs() <= 0.005 + 1e-9);
    }
    let last = trades.last().unwrap().balance_after;
    assert!((import.balance.unwrap() - last).abs() <= 0.005 + 1e-9);

    let before = PerformanceTracker::compute(&trades, 25_000.0);
    let after = PerformanceTracker::compute(&import.trades, 25_000.0);
    assert_eq!(after.total_trades, before.total_trades);
    assert_eq!(after.winning_trades, before.winning_trades);
    assert_eq!(after.losing_trades, before.losing_trades);
    assert_eq!(after.win_rate, before.win_rate);
    assert!((after.total_pnl - before.total_pnl).abs() < 0.02);
    assert!((after.profit_factor - before.profit_factor).abs() < 1e-2);
    assert!((after.max_drawdown_percent - before.max_drawdown_percent).abs() < 1e-3);
    assert_eq!(after.average_trade_duration_hours, before.average_trade_duration_hours);
}

#[test]
fn snapshot_survives_a_cycle() {
    let candles: Vec<Candle> = (0..300)
        .map(|i| {
            let x = i as f64;
            let close = 50.0 + (x * 0.2).sin() * 2.5 + (x * 0.03).cos();
            let open = close - (x * 0.9).sin() * 0.3;
            Candle {
                time: t(i),
                open,
                high: open.max(close) + 0.25,
                low: open.min(close) - 0.25,
                close,
                volume: 500.0 + (i % 9) as f64 * 60.0,
            }
        })
        .collect();
    let mut cfg = CycleConfig::default();
    cfg.engine.max_signal_age_secs = None;

    let state = EngineState::fresh(cfg.risk.starting_balance);
    let (next, report) = process_cycle(&candles, &cfg, &state, t(0)).unwrap();
    let snapshot = Snapshot::capture("SOLUSDT", &next, cfg.risk.starting_balance);
    assert_eq!(snapshot.performance_metrics, report.performance);

    let json = snapshot.encode().unwrap();
    let restored = restore_state(&json, "SOLUSDT", cfg.risk.starting_balance);
    assert_eq!(restored, next);

    // A restored state replays the same batch as a no-op
    let (again, report) = process_cycle(&candles, &cfg, &restored, t(0)).unwrap();
    assert_eq!(again, next);
    assert_eq!(report.candles_processed, 0);
}

#[test]
fn imported_ledger_with_reversed_row_still_restores() {
    let mut csv = export_ledger(&ledger()).unwrap();
    csv.push_str("SELL,100,99,1,1,1,2024-05-06T10:00:00.000Z,2024-05-06T09:30:00.000Z,-30,signal,0.20,1.00\n");
    let import = import_ledger(&csv).unwrap();
    assert_eq!(import.trades.len(), 4);
    assert_eq!(import.skipped, 1);

    let mut state = EngineState::fresh(25_000.0);
    state.trades = import.trades;
    state.balance = import.balance.unwrap();
    let json = Snapshot::capture("BTCUSDT", &state, 25_000.0).encode().unwrap();

    let restored = restore_state(&json, "BTCUSDT", 25_000.0);
    assert_eq!(restored.trades.len(), 4);
    assert_eq!(restored.balance, state.balance);
    assert_ne!(restored.balance, 1.0);
}
