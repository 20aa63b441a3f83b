//! Background progress monitor for batch runs.
//!
//! Long batches can take hours; the monitor logs a one-line summary of the
//! shared counters at a fixed interval.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Counter values at a point in time.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Runs that finished, in any terminal state.
    pub attempted: usize,
    /// Runs whose agent exited cleanly.
    pub completed: usize,
    /// Runs that errored or timed out.
    pub failed: usize,
    /// Runs currently holding a concurrency slot.
    pub in_flight: usize,
    pub elapsed: Duration,
}

/// Shared counters, cloned into every run task.
#[derive(Debug, Clone)]
pub struct ProgressCounters {
    pub attempted: Arc<AtomicUsize>,
    pub completed: Arc<AtomicUsize>,
    pub failed: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
}

impl Default for ProgressCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self {
            attempted: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Records a finished run.
    pub fn record(&self, success: bool) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        if success {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            attempted: self.attempted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            elapsed: start.elapsed(),
        }
    }
}

/// Marks a run as in flight until dropped.
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    pub fn new(counters: &ProgressCounters) -> Self {
        counters.in_flight.fetch_add(1, Ordering::Relaxed);
        Self {
            counter: counters.in_flight.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A background task that periodically logs batch progress.
///
/// Call [`ProgressMonitor::stop`] to cancel.
pub struct ProgressMonitor {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    /// Starts logging every `interval`. `total` is the number of pending
    /// runs in this invocation.
    pub fn start(counters: ProgressCounters, total: usize, interval: Duration) -> Self {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag = stop_flag.clone();
        let start = Instant::now();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // skip the immediate first tick

            loop {
                tick.tick().await;
                if flag.load(Ordering::Relaxed) {
                    break;
                }

                let snap = counters.snapshot(start);
                let pct = if total > 0 {
                    (snap.attempted as f64 / total as f64 * 100.0).min(100.0)
                } else {
                    0.0
                };
                let elapsed_secs = snap.elapsed.as_secs_f64();
                let runs_per_min = if elapsed_secs > 0.0 {
                    snap.attempted as f64 / elapsed_secs * 60.0
                } else {
                    0.0
                };

                tracing::info!(
                    attempted = snap.attempted,
                    completed = snap.completed,
                    failed = snap.failed,
                    in_flight = snap.in_flight,
                    total = total,
                    progress_pct = format!("{:.1}%", pct),
                    elapsed_secs = snap.elapsed.as_secs(),
                    runs_per_min = format!("{:.2}", runs_per_min),
                    "Batch progress"
                );
            }
        });

        Self {
            stop_flag,
            handle: Some(handle),
        }
    }

    /// Signals the monitor to stop and waits for it.
    pub async fn stop(mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
