//! Periodic single-flight tick scheduler
//!
//! ## Semantics
//!
//! - First tick fires immediately on `start()`, then every `interval`
//! - Single flight: a firing that finds the previous tick still running is
//!   skipped (not queued)
//! - `stop()` cancels future firings and waits for the in-flight tick
//! - Dropping the scheduler cancels it without waiting
//!
//! ## Cancellation
//!
//! Each tick receives a [`TickContext`]. Once `stop()` is called
//! `is_cancelled()` returns `true`; whatever the tick observed after that
//! point must not be committed.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Handed to every tick
#[derive(Debug, Clone)]
pub struct TickContext {
    sequence: u64,
    cancel_rx: watch::Receiver<bool>,
}

impl TickContext {
    /// 1-based number of this tick within the current run
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether `stop()` has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

/// Counters shared between the scheduler handle and its loop
#[derive(Debug, Default)]
struct SchedulerStats {
    ticks_started: AtomicU64,
    ticks_skipped: AtomicU64,
    in_flight: AtomicBool,
}

/// Resets the in-flight flag even if the tick panics
struct InFlightGuard(Arc<SchedulerStats>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

struct Running {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Cancellable periodic task with single-flight ticks
#[derive(Default)]
pub struct Scheduler {
    running: Option<Running>,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start firing `on_tick`
    ///
    /// # Returns
    ///
    /// - `true`: A new timer was armed
    /// - `false`: Already running, or `interval` is zero; nothing changed
    pub fn start<F, Fut>(&mut self, interval: Duration, on_tick: F) -> bool
    where
        F: Fn(TickContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.running.is_some() {
            debug!("Scheduler already running, ignoring start");
            return false;
        }
        if interval.is_zero() {
            warn!("Refusing to schedule ticks with a zero interval");
            return false;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stats = Arc::clone(&self.stats);
        let handle = tokio::spawn(run_loop(interval, on_tick, cancel_rx, stats));

        self.running = Some(Running { cancel_tx, handle });
        true
    }

    /// Cancel future firings and wait for the in-flight tick to finish
    ///
    /// # Returns
    ///
    /// `true` if the scheduler was running.
    pub async fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };

        let _ = running.cancel_tx.send(true);
        if let Err(e) = running.handle.await {
            warn!("Scheduler loop ended abnormally: {}", e);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Whether a tick is executing right now
    pub fn tick_in_flight(&self) -> bool {
        self.stats.in_flight.load(Ordering::SeqCst)
    }

    /// Ticks started since construction
    pub fn ticks_started(&self) -> u64 {
        self.stats.ticks_started.load(Ordering::SeqCst)
    }

    /// Firings dropped because the previous tick was still running
    pub fn ticks_skipped(&self) -> u64 {
        self.stats.ticks_skipped.load(Ordering::SeqCst)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.cancel_tx.send(true);
        }
    }
}

async fn run_loop<F, Fut>(
    interval: Duration,
    on_tick: F,
    mut cancel_rx: watch::Receiver<bool>,
    stats: Arc<SchedulerStats>,
) where
    F: Fn(TickContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut current: Option<JoinHandle<()>> = None;
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            biased;

            // Err means the handle was dropped, which is also a cancel
            _ = cancel_rx.changed() => break,

            _ = ticker.tick() => {
                if current.as_ref().is_some_and(|tick| !tick.is_finished()) {
                    stats.ticks_skipped.fetch_add(1, Ordering::SeqCst);
                    debug!("Previous tick still running, skipping this firing");
                    continue;
                }

                sequence += 1;
                stats.ticks_started.fetch_add(1, Ordering::SeqCst);
                stats.in_flight.store(true, Ordering::SeqCst);

                let ctx = TickContext {
                    sequence,
                    cancel_rx: cancel_rx.clone(),
                };
                let guard = InFlightGuard(Arc::clone(&stats));
                let tick = on_tick(ctx);
                current = Some(tokio::spawn(async move {
                    let _guard = guard;
                    tick.await;
                }));
            }
        }
    }

    if let Some(tick) = current
        && let Err(e) = tick.await
    {
        warn!("Tick task failed: {}", e);
    }
    debug!("Scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn test_fires_immediately_then_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let counter = Arc::clone(&count);
        assert!(scheduler.start(Duration::from_secs(60), move |_ctx| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(124)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        assert!(scheduler.stop().await);
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_firings_are_skipped() {
        let mut scheduler = Scheduler::new();
        scheduler.start(Duration::from_secs(60), |_ctx| async {
            tokio::time::sleep(Duration::from_secs(150)).await;
        });

        // Ticks at 0 and 180 run; 60, 120, 240 and 300 find a tick in flight
        tokio::time::sleep(Duration::from_secs(310)).await;
        assert_eq!(scheduler.ticks_started(), 2);
        assert_eq!(scheduler.ticks_skipped(), 4);
        assert!(scheduler.tick_in_flight());

        scheduler.stop().await;
        assert!(!scheduler.tick_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_in_flight_tick() {
        let finished = Arc::new(AtomicBool::new(false));
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let mut scheduler = Scheduler::new();

        let (finished_flag, cancel_flag) = (Arc::clone(&finished), Arc::clone(&saw_cancel));
        scheduler.start(Duration::from_secs(300), move |ctx| {
            let finished = Arc::clone(&finished_flag);
            let saw_cancel = Arc::clone(&cancel_flag);
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                saw_cancel.store(ctx.is_cancelled(), Ordering::SeqCst);
                finished.store(true, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.tick_in_flight());

        assert!(scheduler.stop().await);
        assert!(finished.load(Ordering::SeqCst), "stop must wait for the tick");
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_stop_twice() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.start(Duration::from_secs(60), |_ctx| async {}));
        assert!(!scheduler.start(Duration::from_secs(60), |_ctx| async {}));

        assert!(scheduler.stop().await);
        assert!(!scheduler.stop().await);

        // Restart after stop arms a fresh timer
        assert!(scheduler.start(Duration::from_secs(60), |_ctx| async {}));
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let mut scheduler = Scheduler::new();
        assert!(!scheduler.start(Duration::ZERO, |_ctx| async {}));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_sequence_numbers() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let log = Arc::clone(&seen);
        scheduler.start(Duration::from_secs(10), move |ctx| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(ctx.sequence());
            }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.stop().await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
