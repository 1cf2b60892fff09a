//! Tick sources and the scheduled refresh loop.
//!
//! When a cycle runs is decided by a `TickSource`; what a cycle does is
//! `InstrumentRunner::run_cycle`. A tick that arrives while the previous
//! refresh is still running is skipped, never queued.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use candlesim_core::engine::CycleReport;

use crate::instrument::{run_instruments_parallel, InstrumentRunner, RunError};

/// Per-instrument outcome of one refresh.
pub type RefreshResults = Vec<(String, Result<CycleReport, RunError>)>;

// ─── Overlap guard ──────────────────────────────────────────────────

/// Lets at most one refresh run at a time.
#[derive(Debug, Default)]
pub struct CycleGuard {
    busy: AtomicBool,
}

/// Proof of holding the guard; releases it on drop.
#[derive(Debug)]
pub struct CycleTicket<'a> {
    busy: &'a AtomicBool,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard, or `None` if a refresh is already running.
    pub fn try_enter(&self) -> Option<CycleTicket<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| CycleTicket { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for CycleTicket<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ─── Tick sources ───────────────────────────────────────────────────

/// Decides when the next refresh happens.
pub trait TickSource {
    /// Block until the next tick and return its time, or `None` when the
    /// source is exhausted.
    fn next_tick(&mut self) -> Option<DateTime<Utc>>;
}

/// Wall-clock ticks on a fixed interval.
///
/// The first tick fires immediately. Ticks missed while the caller was busy
/// are dropped, so a slow cycle is followed by one tick, not a burst.
#[derive(Debug)]
pub struct IntervalTicks {
    interval: Duration,
    next: Option<Instant>,
    remaining: Option<usize>,
}

impl IntervalTicks {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next: None,
            remaining: None,
        }
    }

    /// Stop after `count` ticks.
    pub fn limit(mut self, count: usize) -> Self {
        self.remaining = Some(count);
        self
    }
}

impl TickSource for IntervalTicks {
    fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        let now = Instant::now();
        let due = self.next.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        } else if now.duration_since(due) >= self.interval {
            let missed = (now.duration_since(due).as_nanos() / self.interval.as_nanos()) as u64;
            debug!(missed, "dropping missed ticks");
        }

        let fired = Instant::now();
        let mut next = due + self.interval;
        while next <= fired {
            next += self.interval;
        }
        self.next = Some(next);
        Some(Utc::now())
    }
}

/// Scripted ticks, returned in order.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    queue: VecDeque<DateTime<Utc>>,
}

impl ManualTicks {
    pub fn new(ticks: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            queue: ticks.into_iter().collect(),
        }
    }

    pub fn push(&mut self, tick: DateTime<Utc>) {
        self.queue.push_back(tick);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl TickSource for ManualTicks {
    fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        self.queue.pop_front()
    }
}

// ─── Scheduler ──────────────────────────────────────────────────────

/// Counters for one `Scheduler::run`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub ticks: usize,
    /// Refreshes that ran.
    pub refreshes: usize,
    /// Ticks dropped because a refresh was still running.
    pub skipped: usize,
    /// Instrument cycles that returned an error.
    pub failures: usize,
}

/// Runs every instrument's cycle on each tick.
///
/// The scheduler is `Sync`: `refresh` may be called from another thread
/// (e.g. a manual refresh) while `run` is looping, and the guard ensures the
/// two never overlap.
#[derive(Debug)]
pub struct Scheduler {
    runners: Mutex<Vec<InstrumentRunner>>,
    guard: CycleGuard,
    stop: AtomicBool,
}

impl Scheduler {
    pub fn new(runners: Vec<InstrumentRunner>) -> Self {
        Self {
            runners: Mutex::new(runners),
            guard: CycleGuard::new(),
            stop: AtomicBool::new(false),
        }
    }

    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    /// Ask `run` to return before its next tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// One refresh of every instrument at `now`, or `None` if a refresh is
    /// already in progress.
    pub fn refresh(&self, now: DateTime<Utc>) -> Option<RefreshResults> {
        let Some(_ticket) = self.guard.try_enter() else {
            debug!(%now, "refresh already running, tick skipped");
            return None;
        };
        let mut runners = self.runners.lock().unwrap_or_else(PoisonError::into_inner);
        Some(run_instruments_parallel(&mut runners, now))
    }

    /// Loop over `ticks` until the source is exhausted or `stop` is called.
    pub fn run<T: TickSource>(
        &self,
        ticks: &mut T,
        on_refresh: Option<&dyn Fn(DateTime<Utc>, &RefreshResults)>,
    ) -> SchedulerStats {
        let mut stats = SchedulerStats::default();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!(?stats, "scheduler stopped");
                break;
            }
            let Some(now) = ticks.next_tick() else {
                break;
            };
            stats.ticks += 1;

            let Some(results) = self.refresh(now) else {
                stats.skipped += 1;
                continue;
            };
            stats.refreshes += 1;
            for (symbol, result) in &results {
                if let Err(e) = result {
                    stats.failures += 1;
                    debug!(%symbol, error = %e, "instrument cycle failed");
                }
            }
            if let Some(cb) = on_refresh {
                cb(now, &results);
            }
        }
        stats
    }

    /// Read access to the runners between refreshes.
    pub fn with_runners<R>(&self, f: impl FnOnce(&[InstrumentRunner]) -> R) -> R {
        let runners = self.runners.lock().unwrap_or_else(PoisonError::into_inner);
        f(&runners)
    }

    pub fn into_runners(self) -> Vec<InstrumentRunner> {
        self.runners.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
