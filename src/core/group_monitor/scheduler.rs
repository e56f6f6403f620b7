//! Periodic tick driver for a sampling session.
//!
//! The scheduler owns a small Tokio runtime. An interval timer fires on the
//! runtime; every firing that finds the previous tick finished runs the tick
//! on the blocking pool. Firings that land while a tick is still executing are
//! dropped rather than queued.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::{MonitorError, Result};

type TickFn = dyn Fn() -> Result<()> + Send + Sync;

thread_local! {
    static IN_TICK: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is currently executing a tick
pub fn in_tick() -> bool {
    IN_TICK.with(|flag| flag.get())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TickState {
    Idle = 0,
    Sampling = 1,
}

/// Re-entrancy guard: at most one tick holds a [`TickPermit`] at a time
#[derive(Debug)]
pub struct TickGuard {
    state: AtomicU8,
}

impl TickGuard {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TickState::Idle as u8),
        }
    }

    pub fn state(&self) -> TickState {
        if self.state.load(Ordering::Acquire) == TickState::Sampling as u8 {
            TickState::Sampling
        } else {
            TickState::Idle
        }
    }

    /// Move Idle -> Sampling, or `None` if a tick is already running
    pub fn try_enter(self: &Arc<Self>) -> Option<TickPermit> {
        self.state
            .compare_exchange(
                TickState::Idle as u8,
                TickState::Sampling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| TickPermit {
                guard: Arc::clone(self),
            })
    }
}

impl Default for TickGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the guard to Idle when dropped
#[derive(Debug)]
pub struct TickPermit {
    guard: Arc<TickGuard>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.guard
            .state
            .store(TickState::Idle as u8, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Counters {
    fired: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    faulted: AtomicU64,
}

/// Tick accounting since the scheduler started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Timer firings, including skipped ones
    pub fired: u64,
    /// Firings dropped because a tick was still executing
    pub skipped: u64,
    pub completed: u64,
    /// Ticks that returned an error or panicked
    pub faulted: u64,
}

pub struct SamplingScheduler {
    runtime: Option<tokio::runtime::Runtime>,
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: broadcast::Sender<()>,
    loop_handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl SamplingScheduler {
    /// Start firing `tick` every `period`. The first firing happens one
    /// period after start.
    pub fn start<F>(period: Duration, tick: F) -> Result<Self>
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(MonitorError::InvalidInterval(0));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(2)
            .enable_time()
            .thread_name("pgmon-scheduler")
            .build()
            .map_err(|e| MonitorError::runtime(format!("Failed to build runtime: {}", e)))?;

        let (interval_tx, interval_rx) = watch::channel(period);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let counters = Arc::new(Counters::default());

        let tick: Arc<TickFn> = Arc::new(tick);
        let loop_handle = runtime.spawn(run_loop(
            tick,
            interval_rx,
            shutdown_tx.subscribe(),
            Arc::new(TickGuard::new()),
            Arc::clone(&counters),
        ));

        Ok(Self {
            runtime: Some(runtime),
            interval_tx,
            shutdown_tx,
            loop_handle: Some(loop_handle),
            counters,
        })
    }

    /// Applies from the next firing on
    pub fn set_interval(&self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(MonitorError::InvalidInterval(0));
        }
        self.interval_tx.send_replace(period);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle.is_some()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            fired: self.counters.fired.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            faulted: self.counters.faulted.load(Ordering::Relaxed),
        }
    }

    /// Stop the timer and wait for an in-flight tick to finish. Idempotent.
    ///
    /// Called from inside a tick (for example by a subscriber), this only
    /// signals the loop: the caller is itself the in-flight tick.
    pub fn stop(&mut self) {
        let Some(handle) = self.loop_handle.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(());

        if in_tick() {
            return;
        }
        if let Some(runtime) = self.runtime.as_ref() {
            if let Err(e) = runtime.block_on(handle) {
                log::error!("Scheduler loop ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            if in_tick() {
                runtime.shutdown_background();
            }
        }
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_loop(
    tick: Arc<TickFn>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown: broadcast::Receiver<()>,
    guard: Arc<TickGuard>,
    counters: Arc<Counters>,
) {
    let mut ticker = new_ticker(*interval_rx.borrow_and_update());
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                counters.fired.fetch_add(1, Ordering::Relaxed);

                let Some(permit) = guard.try_enter() else {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Previous tick still running, skipping this firing");
                    continue;
                };

                let tick = Arc::clone(&tick);
                let counters = Arc::clone(&counters);
                in_flight = Some(tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    run_tick(tick.as_ref(), &counters);
                }));
            }
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                log::debug!("Sampling interval changed to {} ms", period.as_millis());
                ticker = new_ticker(period);
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }

    if let Some(handle) = in_flight {
        let _ = handle.await;
    }
}

fn run_tick(tick: &TickFn, counters: &Counters) {
    IN_TICK.with(|flag| flag.set(true));
    let outcome = catch_unwind(AssertUnwindSafe(tick));
    IN_TICK.with(|flag| flag.set(false));

    match outcome {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(e)) => {
            counters.faulted.fetch_add(1, Ordering::Relaxed);
            log::error!("Sampling tick failed: {}", e);
        }
        Err(_) => {
            counters.faulted.fetch_add(1, Ordering::Relaxed);
            log::error!("Sampling tick panicked, continuing with the next interval");
        }
    }
}
