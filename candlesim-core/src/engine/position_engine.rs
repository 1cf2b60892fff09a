//! PositionEngine: the single-slot Flat / Long / Short state machine.
//!
//! Per candle the signal is applied first (open, flip, add or ignore), then
//! the exit check runs against the stop-loss and take-profit levels. The exit
//! check only considers candles after the position's entry candle: a signal
//! is acted on at the close of its candle, after that candle's range printed.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::config::{EngineConfig, RiskConfig};
use super::events::{EngineEvent, IgnoreReason, Rejection};
use super::state::EngineState;
use crate::domain::{Candle, ExitReason, Position, PositionSide, Signal, Trade};

/// Take-profit shift beyond the partial exit price for the remaining half.
const PARTIAL_TARGET_SHIFT: f64 = 0.01;

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

#[derive(Debug, Clone)]
pub struct PositionEngine {
    risk: RiskConfig,
    engine: EngineConfig,
}

impl PositionEngine {
    pub fn new(risk: RiskConfig, engine: EngineConfig) -> Self {
        Self { risk, engine }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    /// Units bought for one entry: `min(balance * pct, balance * max_allocation) / price`,
    /// rounded to 8 decimals.
    pub fn position_size(&self, balance: f64, price: f64) -> f64 {
        let budget = (balance * self.risk.position_size_percent / 100.0)
            .min(balance * self.engine.max_allocation);
        round8(budget / price)
    }

    /// Stop-loss and take-profit for a fresh entry.
    pub fn exit_levels(&self, side: PositionSide, entry: f64) -> (f64, f64) {
        let s = side.sign();
        (
            entry * (1.0 - s * self.risk.stop_loss_percent / 100.0),
            entry * (1.0 + s * self.risk.take_profit_percent / 100.0),
        )
    }

    /// Execution prices must lie within the candle range widened by slippage.
    pub fn check_price(&self, price: f64, candle: &Candle) -> Result<(), Rejection> {
        let min = candle.low * (1.0 - self.risk.slippage_rate);
        let max = candle.high * (1.0 + self.risk.slippage_rate);
        if price.is_finite() && price > 0.0 && price >= min && price <= max {
            Ok(())
        } else {
            Err(Rejection::PriceOutsideTolerance { price, min, max })
        }
    }

    /// Replay one candle: signal first, then the exit check.
    pub fn step(
        &self,
        state: &mut EngineState,
        candle: &Candle,
        signal: Option<&Signal>,
        now: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if let Some(signal) = signal {
            self.apply_signal(state, candle, signal, now, &mut events);
        }
        events.extend(self.check_exit(state, candle));
        events
    }

    pub fn apply_signal(
        &self,
        state: &mut EngineState,
        candle: &Candle,
        signal: &Signal,
        now: DateTime<Utc>,
        events: &mut Vec<EngineEvent>,
    ) {
        let Some(side) = signal.side() else {
            return;
        };
        let time = candle.time;

        if let Some(max_age) = self.engine.max_signal_age_secs {
            let age_secs = (now - time).num_seconds();
            if age_secs > max_age {
                debug!(%time, age_secs, "ignoring stale signal");
                events.push(EngineEvent::Ignored {
                    time,
                    reason: IgnoreReason::Stale { age_secs },
                });
                return;
            }
        }

        let price = signal.reference_price;
        if let Err(reason) = self.check_price(price, candle) {
            events.push(reject(time, reason));
            return;
        }

        let held = state
            .position
            .as_ref()
            .map(|p| (p.side, p.signal_confidence, p.in_profit(candle.close)));

        match held {
            None => events.push(self.open(state, side, price, time, signal.confidence)),
            Some((held_side, held, _)) if held_side != side => {
                if signal.confidence > held {
                    events.extend(self.close(state, price, time, ExitReason::Signal));
                    events.push(self.open(state, side, price, time, signal.confidence));
                } else {
                    debug!(%time, confidence = signal.confidence, held, "opposite signal not stronger than position");
                    events.push(EngineEvent::Ignored {
                        time,
                        reason: IgnoreReason::NotStrongerThanPosition {
                            confidence: signal.confidence,
                            held,
                        },
                    });
                }
            }
            Some((_, held, in_profit)) => {
                let qualifies = signal.confidence > held && in_profit;
                match state.position.as_mut() {
                    Some(position) if qualifies => events.push(self.add(
                        position,
                        &mut state.balance,
                        price,
                        candle.close,
                        time,
                        signal.confidence,
                    )),
                    _ => {
                        debug!(%time, confidence = signal.confidence, held, in_profit, "add conditions not met");
                        events.push(EngineEvent::Ignored {
                            time,
                            reason: IgnoreReason::AddNotQualified {
                                confidence: signal.confidence,
                                held,
                                in_profit,
                            },
                        });
                    }
                }
            }
        }
    }

    /// Stop-loss before take-profit when a candle crosses both.
    pub fn check_exit(&self, state: &mut EngineState, candle: &Candle) -> Option<EngineEvent> {
        let position = state.position.as_ref()?;
        if candle.time <= position.entry_time {
            return None;
        }

        let (stop_hit, target_hit) = match position.side {
            PositionSide::Buy => (
                candle.low <= position.stop_loss,
                candle.high >= position.take_profit,
            ),
            PositionSide::Sell => (
                candle.high >= position.stop_loss,
                candle.low <= position.take_profit,
            ),
        };

        if stop_hit {
            let price = position.stop_loss;
            return self.close(state, price, candle.time, ExitReason::StopLoss);
        }
        if !target_hit {
            return None;
        }

        let price = position.take_profit;
        if self.engine.partial_take_profit && !position.partially_closed {
            let position = state.position.as_mut()?;
            let event = self.partial_close(position, &mut state.balance, price, candle.time);
            if let Some(trade) = event.trade() {
                state.trades.push(trade.clone());
            }
            Some(event)
        } else {
            self.close(state, price, candle.time, ExitReason::TakeProfit)
        }
    }

    fn open(
        &self,
        state: &mut EngineState,
        side: PositionSide,
        price: f64,
        time: DateTime<Utc>,
        confidence: u32,
    ) -> EngineEvent {
        let size = self.position_size(state.balance, price);
        if !(size.is_finite() && size > 0.0) {
            return reject(time, Rejection::NonPositiveSize { size });
        }

        let notional = size * price;
        let commission = notional * self.risk.commission_rate;
        let (stop_loss, take_profit) = self.exit_levels(side, price);
        let balance_delta = -(notional + commission);
        state.balance += balance_delta;
        state.position = Some(Position {
            side,
            entry_price: price,
            entry_time: time,
            size,
            stop_loss,
            take_profit,
            commission_paid: commission,
            signal_confidence: confidence,
            cost_basis: notional,
            partially_closed: false,
        });

        info!(%time, side = side.as_str(), price, size, confidence, "position opened");
        EngineEvent::Opened {
            time,
            side,
            price,
            size,
            commission,
            confidence,
            balance_delta,
        }
    }

    /// Scale into a winning position. The entry moves to the midpoint of the
    /// mark and the old entry, and both exit distances are halved from there.
    fn add(
        &self,
        position: &mut Position,
        balance: &mut f64,
        price: f64,
        mark: f64,
        time: DateTime<Utc>,
        confidence: u32,
    ) -> EngineEvent {
        let added_size = self.position_size(*balance, price);
        if !(added_size.is_finite() && added_size > 0.0) {
            return reject(time, Rejection::NonPositiveSize { size: added_size });
        }

        let notional = added_size * price;
        let commission = notional * self.risk.commission_rate;
        let balance_delta = -(notional + commission);
        *balance += balance_delta;

        position.size += added_size;
        position.commission_paid += commission;
        position.cost_basis += notional;

        let s = position.side.sign();
        let entry = (mark + position.entry_price) / 2.0;
        let stop_distance = (s * (entry - position.stop_loss)).max(0.0);
        let target_distance = (s * (position.take_profit - entry)).max(0.0);
        position.entry_price = entry;
        position.stop_loss = entry - s * stop_distance * 0.5;
        position.take_profit = entry + s * target_distance * 0.5;
        position.signal_confidence = confidence;

        info!(%time, side = position.side.as_str(), price, added_size, entry, "position added");
        EngineEvent::Added {
            time,
            side: position.side,
            price,
            added_size,
            commission,
            new_entry_price: entry,
            balance_delta,
        }
    }

    fn close(
        &self,
        state: &mut EngineState,
        exit_price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<EngineEvent> {
        let position = state.position.take()?;
        let event = self.realize(
            &position,
            position.size,
            position.cost_basis,
            position.commission_paid,
            exit_price,
            time,
            reason,
            &mut state.balance,
        );
        if let Some(trade) = event.trade() {
            state.trades.push(trade.clone());
        }
        Some(event)
    }

    fn partial_close(
        &self,
        position: &mut Position,
        balance: &mut f64,
        exit_price: f64,
        time: DateTime<Utc>,
    ) -> EngineEvent {
        let half = position.size / 2.0;
        let basis_share = position.cost_basis / 2.0;
        let commission_share = position.commission_paid / 2.0;
        let event = self.realize(
            position,
            half,
            basis_share,
            commission_share,
            exit_price,
            time,
            ExitReason::PartialTakeProfit,
            balance,
        );

        position.size -= half;
        position.cost_basis -= basis_share;
        position.commission_paid -= commission_share;
        position.take_profit = exit_price * (1.0 + position.side.sign() * PARTIAL_TARGET_SHIFT);
        position.partially_closed = true;
        event
    }

    /// Settle `size` units of `position` at `exit_price`, crediting the
    /// returned basis plus P&L less the exit commission.
    #[allow(clippy::too_many_arguments)]
    fn realize(
        &self,
        position: &Position,
        size: f64,
        basis: f64,
        entry_commission: f64,
        exit_price: f64,
        time: DateTime<Utc>,
        reason: ExitReason,
        balance: &mut f64,
    ) -> EngineEvent {
        let rate = self.risk.quote_conversion_rate;
        let pnl_amount = position.side.sign() * size * (exit_price - position.entry_price) * rate;
        let exit_commission = size * exit_price * self.risk.commission_rate;
        let balance_delta = basis + pnl_amount - exit_commission;
        *balance += balance_delta;

        let invested = size * position.entry_price * rate;
        let pnl_percent = if invested > 0.0 {
            pnl_amount / invested * 100.0
        } else {
            0.0
        };

        info!(%time, side = position.side.as_str(), exit_price, pnl_amount, reason = reason.as_str(), "position closed");
        EngineEvent::Closed {
            trade: Trade {
                side: position.side,
                entry_price: position.entry_price,
                exit_price,
                size,
                entry_time: position.entry_time,
                exit_time: time,
                pnl_amount,
                pnl_percent,
                exit_reason: reason,
                commissions: entry_commission + exit_commission,
                balance_after: *balance,
            },
            balance_delta,
        }
    }
}

fn reject(time: DateTime<Utc>, reason: Rejection) -> EngineEvent {
    warn!(%time, %reason, "operation rejected");
    EngineEvent::Rejected { time, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignalDirection;
    use chrono::{Duration, TimeZone};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap() + Duration::minutes(minute)
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

    fn engine() -> PositionEngine {
        PositionEngine::new(RiskConfig::default(), EngineConfig::default())
    }

    fn no_partials() -> PositionEngine {
        PositionEngine::new(
            RiskConfig::default(),
            EngineConfig {
                partial_take_profit: false,
                ..Default::default()
            },
        )
    }

    fn buy(confidence: u32, price: f64) -> Signal {
        Signal::new(SignalDirection::StrongBuy, confidence, price)
    }

    fn sell(confidence: u32, price: f64) -> Signal {
        Signal::new(SignalDirection::StrongSell, confidence, price)
    }

    fn audit(start: f64, events: &[EngineEvent], state: &EngineState) {
        let sum: f64 = events.iter().map(EngineEvent::balance_delta).sum();
        assert!((start + sum - state.balance).abs() < 1e-6);
    }

    #[test]
    fn opens_long_from_flat() {
        let mut state = EngineState::fresh(25_000.0);
        let c = candle(0, 101.0, 99.8, 100.5);
        let events = engine().step(&mut state, &c, Some(&buy(6, 100.0)), c.time);

        let pos = state.position.as_ref().unwrap();
        assert_eq!(pos.side, PositionSide::Buy);
        assert_eq!(pos.entry_price, 100.0);
        assert_eq!(pos.size, 25.0);
        assert!((pos.stop_loss - 99.6).abs() < 1e-9);
        assert!((pos.take_profit - 100.8).abs() < 1e-9);
        assert!((state.balance - (25_000.0 - 25.0 * 100.0 * 1.001)).abs() < 1e-9);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EngineEvent::Opened { confidence: 6, .. }));
    }

    #[test]
    fn entry_candle_range_is_not_an_exit() {
        let mut state = EngineState::fresh(25_000.0);
        // Low of the signal candle is below the new stop
        let c = candle(0, 101.0, 95.0, 100.0);
        engine().step(&mut state, &c, Some(&buy(6, 100.0)), c.time);
        assert!(state.position.is_some());
    }

    #[test]
    fn stop_loss_wins_when_both_levels_cross() {
        let mut state = EngineState::fresh(25_000.0);
        let c0 = candle(0, 101.0, 99.9, 100.0);
        let eng = engine();
        eng.step(&mut state, &c0, Some(&buy(6, 100.0)), c0.time);
        {
            let pos = state.position.as_mut().unwrap();
            pos.stop_loss = 98.0;
            pos.take_profit = 105.0;
        }
        let c1 = candle(1, 106.0, 97.0, 100.0);
        let event = eng.check_exit(&mut state, &c1).unwrap();
        let trade = event.trade().unwrap();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 98.0);
        assert!(state.position.is_none());
        assert_eq!(state.trades.len(), 1);
    }

    #[test]
    fn long_close_accounting() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = no_partials();
        let c0 = candle(0, 100.0, 99.9, 100.0);
        let mut events = eng.step(&mut state, &c0, Some(&buy(6, 100.0)), c0.time);
        let c1 = candle(1, 101.0, 100.0, 100.9);
        events.extend(eng.step(&mut state, &c1, None, c1.time));

        let trade = &state.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        let exit = 100.8;
        assert!((trade.exit_price - exit).abs() < 1e-9);
        assert!((trade.pnl_amount - 25.0 * 0.8).abs() < 1e-6);
        assert!((trade.pnl_percent - 0.8).abs() < 1e-6);
        let commissions = 2.5 + 25.0 * exit * 0.001;
        assert!((trade.commissions - commissions).abs() < 1e-9);
        assert!((state.balance - (25_000.0 + 20.0 - commissions)).abs() < 1e-6);
        assert_eq!(trade.balance_after, state.balance);
        audit(25_000.0, &events, &state);
    }

    #[test]
    fn short_is_margin_funded_and_profits_on_decline() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = no_partials();
        let c0 = candle(0, 100.1, 100.0, 100.0);
        let mut events = eng.step(&mut state, &c0, Some(&sell(6, 100.0)), c0.time);
        assert!((state.balance - (25_000.0 - 2502.5)).abs() < 1e-9);
        let pos = state.position.as_ref().unwrap();
        assert!((pos.stop_loss - 100.4).abs() < 1e-9);
        assert!((pos.take_profit - 99.2).abs() < 1e-9);

        let c1 = candle(1, 100.0, 99.0, 99.1);
        events.extend(eng.step(&mut state, &c1, None, c1.time));
        let trade = &state.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!((trade.pnl_amount - 25.0 * 0.8).abs() < 1e-6);
        audit(25_000.0, &events, &state);
    }

    #[test]
    fn flip_requires_higher_confidence() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = engine();
        let c0 = candle(0, 100.5, 99.9, 100.0);
        eng.step(&mut state, &c0, Some(&buy(6, 100.0)), c0.time);

        let c1 = candle(1, 100.5, 99.7, 100.0);
        let events = eng.step(&mut state, &c1, Some(&sell(6, 99.8)), c1.time);
        assert!(matches!(
            events[0],
            EngineEvent::Ignored {
                reason: IgnoreReason::NotStrongerThanPosition { confidence: 6, held: 6 },
                ..
            }
        ));
        assert!(state.position.as_ref().unwrap().is_long());

        let c2 = candle(2, 100.5, 99.7, 100.0);
        let events = eng.step(&mut state, &c2, Some(&sell(7, 99.8)), c2.time);
        assert_eq!(events[0].trade().unwrap().exit_reason, ExitReason::Signal);
        assert_eq!(events[0].trade().unwrap().exit_price, 99.8);
        assert!(matches!(events[1], EngineEvent::Opened { side: PositionSide::Sell, .. }));
        assert!(state.position.as_ref().unwrap().is_short());
        assert_eq!(state.trades.len(), 1);
    }

    #[test]
    fn add_blends_entry_and_halves_distances() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = engine();
        let c0 = candle(0, 100.1, 99.95, 100.0);
        let mut events = eng.step(&mut state, &c0, Some(&buy(5, 100.0)), c0.time);

        // Close 100.4 is in profit; high stays below the tightened target.
        let c1 = candle(1, 100.45, 100.2, 100.4);
        events.extend(eng.step(&mut state, &c1, Some(&buy(7, 100.4)), c1.time));
        let pos = state.position.as_ref().unwrap();
        assert!((pos.entry_price - 100.2).abs() < 1e-9);
        // stop distance from 100.2 to 99.6 is 0.6 → 0.3
        assert!((pos.stop_loss - 99.9).abs() < 1e-9);
        // target distance from 100.2 to 100.8 is 0.6 → 0.3
        assert!((pos.take_profit - 100.5).abs() < 1e-9);
        assert_eq!(pos.signal_confidence, 7);
        assert!(pos.size > 25.0);
        assert!(matches!(events.last(), Some(EngineEvent::Added { .. })));
        audit(25_000.0, &events, &state);
    }

    #[test]
    fn no_add_when_not_in_profit() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = engine();
        let c0 = candle(0, 100.1, 99.95, 100.0);
        eng.step(&mut state, &c0, Some(&buy(5, 100.0)), c0.time);
        let c1 = candle(1, 100.1, 99.7, 99.8);
        let events = eng.step(&mut state, &c1, Some(&buy(9, 100.0)), c1.time);
        assert!(matches!(
            events[0],
            EngineEvent::Ignored {
                reason: IgnoreReason::AddNotQualified { in_profit: false, .. },
                ..
            }
        ));
        assert_eq!(state.position.as_ref().unwrap().size, 25.0);
    }

    #[test]
    fn partial_then_full_take_profit() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = engine();
        let c0 = candle(0, 100.1, 99.95, 100.0);
        let mut events = eng.step(&mut state, &c0, Some(&buy(5, 100.0)), c0.time);

        let c1 = candle(1, 100.9, 100.3, 100.85);
        events.extend(eng.step(&mut state, &c1, None, c1.time));
        let first = &state.trades[0];
        assert_eq!(first.exit_reason, ExitReason::PartialTakeProfit);
        assert_eq!(first.size, 12.5);
        let pos = state.position.as_ref().unwrap();
        assert_eq!(pos.size, 12.5);
        assert!(pos.partially_closed);
        assert!((pos.take_profit - 100.8 * 1.01).abs() < 1e-9);
        assert!((pos.commission_paid - 1.25).abs() < 1e-9);

        let c2 = candle(2, 101.9, 101.0, 101.8);
        events.extend(eng.step(&mut state, &c2, None, c2.time));
        assert_eq!(state.trades[1].exit_reason, ExitReason::TakeProfit);
        assert!(state.position.is_none());
        audit(25_000.0, &events, &state);
    }

    #[test]
    fn stale_signal_ignored_but_exit_still_checked() {
        let mut state = EngineState::fresh(25_000.0);
        let eng = engine();
        let c0 = candle(0, 100.1, 99.95, 100.0);
        eng.step(&mut state, &c0, Some(&buy(5, 100.0)), c0.time);

        let c1 = candle(1, 100.2, 99.0, 99.2);
        let now = c1.time + Duration::minutes(10);
        let events = eng.step(&mut state, &c1, Some(&sell(9, 99.1)), now);
        assert!(matches!(
            events[0],
            EngineEvent::Ignored {
                reason: IgnoreReason::Stale { age_secs: 600 },
                ..
            }
        ));
        assert_eq!(events[1].trade().unwrap().exit_reason, ExitReason::StopLoss);
    }

    #[test]
    fn price_outside_band_rejected() {
        let mut state = EngineState::fresh(25_000.0);
        let c = candle(0, 101.0, 99.0, 100.0);
        let events = engine().step(&mut state, &c, Some(&buy(6, 120.0)), c.time);
        assert!(events[0].is_rejection());
        assert!(state.is_flat());
        assert_eq!(state.balance, 25_000.0);
    }

    #[test]
    fn slippage_widens_band() {
        let eng = engine();
        let c = candle(0, 100.0, 99.0, 100.0);
        assert!(eng.check_price(100.05, &c).is_ok());
        assert!(eng.check_price(98.95, &c).is_ok());
        assert!(eng.check_price(100.2, &c).is_err());
        assert!(eng.check_price(f64::NAN, &c).is_err());
    }

    #[test]
    fn empty_balance_rejects_entry() {
        let mut state = EngineState::fresh(0.0);
        let c = candle(0, 101.0, 99.0, 100.0);
        let events = engine().step(&mut state, &c, Some(&buy(6, 100.0)), c.time);
        assert!(matches!(
            events[0],
            EngineEvent::Rejected {
                reason: Rejection::NonPositiveSize { .. },
                ..
            }
        ));
        assert!(state.is_flat());
    }

    #[test]
    fn size_is_capped_and_rounded() {
        let eng = PositionEngine::new(
            RiskConfig {
                position_size_percent: 100.0,
                ..Default::default()
            },
            EngineConfig::default(),
        );
        assert_eq!(eng.position_size(1000.0, 3.0), 300.0);
        assert_eq!(engine().position_size(1000.0, 3.0), 33.33333333);
    }
}
