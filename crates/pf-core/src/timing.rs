//! Lightweight timing for the stepping loop.
//!
//! `Timer` always measures; the accumulating counters in [`step_timing`] only
//! record when timing is enabled via [`enable_timing`] or the `PF_TIMING`
//! environment variable.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable accumulated timing globally.
pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Disable accumulated timing globally.
pub fn disable_timing() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var("PF_TIMING").is_ok()
}

/// Wall-clock timer for one labelled span.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Elapsed seconds so far, without stopping.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop, add to `acc` (when timing is enabled) and return elapsed seconds.
    pub fn stop_into(self, acc: &AccumulatingTimer) -> f64 {
        let elapsed = self.elapsed_s();
        if is_enabled() {
            acc.record(elapsed);
        }
        elapsed
    }

    /// Stop and emit a `debug` event with the elapsed time.
    pub fn stop_and_log(self) -> f64 {
        let elapsed = self.elapsed_s();
        tracing::debug!(phase = self.label, elapsed_s = elapsed, "{} in {:.3}s", self.label, elapsed);
        elapsed
    }
}

/// Accumulating timer for tracking total time across many calls.
pub struct AccumulatingTimer {
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl Default for AccumulatingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatingTimer {
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn record(&self, duration_s: f64) {
        let nanos = (duration_s * 1e9) as u64;
        self.total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_seconds(&self) -> f64 {
        self.total_ns.load(Ordering::Relaxed) as f64 / 1e9
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average_seconds(&self) -> f64 {
        let count = self.count();
        if count > 0 {
            self.total_seconds() / count as f64
        } else {
            0.0
        }
    }

    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Per-phase counters for the pack stepping loop.
pub mod step_timing {
    use super::AccumulatingTimer;

    /// Circuit solves (one per global step plus initialization)
    pub static CIRCUIT_SOLVE: AccumulatingTimer = AccumulatingTimer::new();
    /// Worker pool `step` dispatches, barrier included
    pub static POOL_STEP: AccumulatingTimer = AccumulatingTimer::new();
    /// Worker pool `evaluate` dispatches
    pub static POOL_EVALUATE: AccumulatingTimer = AccumulatingTimer::new();
    /// Gathering shard outputs into the store
    pub static OUTPUT_GATHER: AccumulatingTimer = AccumulatingTimer::new();

    fn all() -> [(&'static str, &'static AccumulatingTimer); 4] {
        [
            ("circuit solve", &CIRCUIT_SOLVE),
            ("pool step", &POOL_STEP),
            ("pool evaluate", &POOL_EVALUATE),
            ("output gather", &OUTPUT_GATHER),
        ]
    }

    pub fn reset_all() {
        for (_, timer) in all() {
            timer.reset();
        }
    }

    /// Log a summary of every phase that recorded at least one call.
    pub fn log_summary() {
        if !super::is_enabled() {
            return;
        }
        for (name, timer) in all() {
            let count = timer.count();
            if count > 0 {
                tracing::info!(
                    "{name}: {count} calls, {:.3}s total, {:.4}ms avg",
                    timer.total_seconds(),
                    timer.average_seconds() * 1000.0
                );
            }
        }
    }
}
