//! Process-wide atomic counters.
//!
//! Call sites increment silently; [`Metrics::flush`] emits every value as a
//! single `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    generation_calls: AtomicU64,
    generation_retries: AtomicU64,
    samples_failed: AtomicU64,
    samples_unsanitizable: AtomicU64,
    executions: AtomicU64,
    executions_timed_out: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            generation_calls: AtomicU64::new(0),
            generation_retries: AtomicU64::new(0),
            samples_failed: AtomicU64::new(0),
            samples_unsanitizable: AtomicU64::new(0),
            executions: AtomicU64::new(0),
            executions_timed_out: AtomicU64::new(0),
        }
    }

    /// Count one backend call, first attempt or retry.
    pub fn inc_generation_calls(&self) {
        self.generation_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one call made after an earlier attempt failed.
    pub fn inc_generation_retries(&self) {
        self.generation_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one sample recorded as `generation_failed`.
    pub fn inc_samples_failed(&self) {
        self.samples_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one sample whose completion could not be sanitized.
    pub fn inc_samples_unsanitizable(&self) {
        self.samples_unsanitizable.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one sandbox run; `timed_out` also bumps the timeout counter.
    pub fn inc_executions(&self, timed_out: bool) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        if timed_out {
            self.executions_timed_out.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Log every counter in one `metric = "flush"` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            generation_calls = self.generation_calls(),
            generation_retries = self.generation_retries(),
            samples_failed = self.samples_failed(),
            samples_unsanitizable = self.samples_unsanitizable(),
            executions = self.executions(),
            executions_timed_out = self.executions_timed_out(),
        );
    }

    /// Backend calls since process start, retries included.
    pub fn generation_calls(&self) -> u64 {
        self.generation_calls.load(Ordering::Relaxed)
    }

    /// Calls that followed a failed attempt.
    pub fn generation_retries(&self) -> u64 {
        self.generation_retries.load(Ordering::Relaxed)
    }

    /// Samples degraded to `generation_failed`.
    pub fn samples_failed(&self) -> u64 {
        self.samples_failed.load(Ordering::Relaxed)
    }

    /// Samples degraded to `unsanitizable`.
    pub fn samples_unsanitizable(&self) -> u64 {
        self.samples_unsanitizable.load(Ordering::Relaxed)
    }

    /// Sandbox runs, whatever their verdict.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Sandbox runs that hit their wall-clock limit.
    pub fn executions_timed_out(&self) -> u64 {
        self.executions_timed_out.load(Ordering::Relaxed)
    }
}
