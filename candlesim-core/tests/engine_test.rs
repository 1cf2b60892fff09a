//! End-to-end cycle tests through the public API.

use candlesim_core::domain::{Candle, ExitReason, PositionSide, Signal, SignalDirection};
use candlesim_core::engine::{
    process_cycle, CycleConfig, EngineConfig, EngineEvent, EngineState, IgnoreReason,
    PositionEngine, RiskConfig,
};
use candlesim_core::indicators::IndicatorPipeline;
use candlesim_core::patterns;
use candlesim_core::performance::PerformanceTracker;
use candlesim_core::signals::SignalEngine;
use chrono::{DateTime, Duration, TimeZone, Utc};

// ── Helpers ──────────────────────────────────────────────────────────

fn t(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 14, 0, 0).unwrap() + Duration::minutes(minute)
}

/// Swinging market: a slow sine with a drift reversal halfway, volume bursts
/// every 11th candle.
fn swing_series(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let drift = if i < n / 2 { x * 0.08 } else { (n - i) as f64 * 0.08 };
            let mid = 200.0 + (x * 0.15).sin() * 6.0 + drift;
            let open = mid - (x * 0.7).cos() * 0.8;
            let close = mid + (x * 0.7).cos() * 0.8;
            Candle {
                time: t(i as i64),
                open,
                high: open.max(close) + 0.9,
                low: open.min(close) - 0.9,
                close,
                volume: if i % 11 == 0 { 4_000.0 } else { 1_000.0 + (i % 5) as f64 * 90.0 },
            }
        })
        .collect()
}

fn replay_config() -> CycleConfig {
    let mut cfg = CycleConfig::default();
    cfg.engine.max_signal_age_secs = None;
    cfg
}

fn candle(minute: i64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        time: t(minute),
        open: close,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

// ── Position engine scenarios ────────────────────────────────────────

#[test]
fn strong_buy_from_flat_opens_long() {
    let risk = RiskConfig {
        stop_loss_percent: 2.0,
        take_profit_percent: 5.0,
        ..RiskConfig::default()
    };
    let engine = PositionEngine::new(risk.clone(), EngineConfig::default());
    let mut state = EngineState::fresh(risk.starting_balance);
    let c = candle(0, 101.0, 99.5, 100.5);
    let signal = Signal::new(SignalDirection::StrongBuy, 6, 100.0);
    engine.step(&mut state, &c, Some(&signal), c.time);

    let balance = risk.starting_balance;
    let size = (balance * 0.10).min(balance * 0.90) / 100.0;
    let pos = state.position.as_ref().expect("position opened");
    assert_eq!(pos.side, PositionSide::Buy);
    assert!((pos.entry_price - 100.0).abs() < 1e-9);
    assert!((pos.size - size).abs() < 1e-8);
    assert!((pos.stop_loss - 100.0 * (1.0 - 2.0 / 100.0)).abs() < 1e-9);
    assert!((pos.take_profit - 105.0).abs() < 1e-9);
    let debit = size * 100.0 * (1.0 + risk.commission_rate);
    assert!((state.balance - (balance - debit)).abs() < 1e-6);
}

#[test]
fn stop_loss_beats_take_profit_on_wide_candle() {
    let engine = PositionEngine::new(RiskConfig::default(), EngineConfig::default());
    let mut state = EngineState::fresh(25_000.0);
    let c0 = candle(0, 100.2, 99.9, 100.0);
    engine.step(&mut state, &c0, Some(&Signal::new(SignalDirection::StrongBuy, 6, 100.0)), c0.time);
    if let Some(pos) = state.position.as_mut() {
        pos.stop_loss = 98.0;
        pos.take_profit = 105.0;
    }

    let c1 = candle(1, 106.0, 97.0, 101.0);
    let events = engine.step(&mut state, &c1, None, c1.time);
    assert_eq!(events.len(), 1);
    let trade = events[0].trade().expect("closed");
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 98.0);
    assert!(state.is_flat());
}

// ── Cycle behaviour ──────────────────────────────────────────────────

#[test]
fn warmup_window_produces_no_signals() {
    let cfg = replay_config();
    let signal_engine = SignalEngine::new(cfg.signals.clone(), cfg.indicators.min_period()).unwrap();
    let short = swing_series(signal_engine.first_signal_index());
    let state = EngineState::fresh(cfg.risk.starting_balance);
    let (next, report) = process_cycle(&short, &cfg, &state, t(0)).unwrap();
    assert_eq!(report.signals_fired, 0);
    assert!(report.events.is_empty());
    assert!(next.is_flat());
    assert_eq!(next.balance, cfg.risk.starting_balance);
}

#[test]
fn signals_reference_the_candle_extreme() {
    let cfg = CycleConfig::default();
    let candles = swing_series(400);
    let pipeline = IndicatorPipeline::new(cfg.indicators.clone()).unwrap();
    let mut frames = pipeline.run(&candles);
    patterns::annotate(&candles, &mut frames);
    let engine = SignalEngine::new(cfg.signals.clone(), cfg.indicators.min_period()).unwrap();

    for (i, signal) in engine.detect(&candles, &frames).into_iter().enumerate() {
        let Some(signal) = signal else { continue };
        assert!(i >= engine.first_signal_index());
        match signal.side() {
            Some(PositionSide::Buy) => assert_eq!(signal.reference_price, candles[i].high),
            Some(PositionSide::Sell) => assert_eq!(signal.reference_price, candles[i].low),
            None => panic!("fired signal without a side at {i}"),
        }
        if signal.direction.is_strong() {
            assert!(signal.confidence >= cfg.signals.strong_threshold());
        }
    }
}

#[test]
fn cycle_report_is_consistent_with_state() {
    let cfg = replay_config();
    let candles = swing_series(400);
    let state = EngineState::fresh(cfg.risk.starting_balance);
    let (next, report) = process_cycle(&candles, &cfg, &state, t(0)).unwrap();

    assert_eq!(report.candles_processed, candles.len());
    assert_eq!(report.trades_closed(), next.trades.len());
    assert_eq!(
        report.performance,
        PerformanceTracker::compute(&next.trades, cfg.risk.starting_balance)
    );
    let sum: f64 = report.events.iter().map(EngineEvent::balance_delta).sum();
    assert!((cfg.risk.starting_balance + sum - next.balance).abs() < 1e-6);

    for pair in next.trades.windows(2) {
        assert!(pair[0].exit_time <= pair[1].exit_time);
    }
    let frame = report.latest_frame.expect("frame for newest candle");
    assert!(frame.rsi.is_some());
    assert!(frame.atr.is_some());
    assert!(frame.macd_signal.is_some());
    assert!(frame.supertrend_direction.is_some());
}

#[test]
fn stale_batch_opens_nothing() {
    let mut cfg = CycleConfig::default();
    cfg.engine.max_signal_age_secs = Some(60);
    let candles = swing_series(400);
    let state = EngineState::fresh(cfg.risk.starting_balance);
    let now = t(400) + Duration::hours(6);
    let (next, report) = process_cycle(&candles, &cfg, &state, now).unwrap();

    assert!(next.is_flat());
    assert!(next.trades.is_empty());
    assert_eq!(next.balance, cfg.risk.starting_balance);
    for event in &report.events {
        assert!(matches!(
            event,
            EngineEvent::Ignored {
                reason: IgnoreReason::Stale { .. },
                ..
            }
        ));
    }
    assert_eq!(report.events.len(), report.signals_fired);
}

#[test]
fn new_candles_continue_from_watermark() {
    let cfg = replay_config();
    let candles = swing_series(300);
    let fresh = EngineState::fresh(cfg.risk.starting_balance);
    let (first, _) = process_cycle(&candles[..250], &cfg, &fresh, t(0)).unwrap();
    let (second, report) = process_cycle(&candles[50..], &cfg, &first, t(0)).unwrap();

    assert_eq!(report.candles_already_seen, 200);
    assert_eq!(report.candles_processed, 50);
    assert_eq!(second.last_processed_time, Some(candles[299].time));
    assert!(second.trades.len() >= first.trades.len());
    assert_eq!(&second.trades[..first.trades.len()], &first.trades[..]);
}
