//! Process-wide engine counters.
//!
//! Call sites bump counters on [`METRICS`]; the orchestrator calls
//! [`Metrics::flush`] once per finished run, which logs a single line with
//! every value.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub static METRICS: Metrics = Metrics::new();

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub candidates_started: u64,
    pub candidates_failed: u64,
    pub generation_retries: u64,
    pub events_emitted: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    candidates_started: AtomicU64,
    candidates_failed: AtomicU64,
    generation_retries: AtomicU64,
    events_emitted: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            candidates_started: AtomicU64::new(0),
            candidates_failed: AtomicU64::new(0),
            generation_retries: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_candidates_started(&self) {
        self.candidates_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "candidates_started", "counter incremented");
    }

    pub fn inc_candidates_failed(&self) {
        self.candidates_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "candidates_failed", "counter incremented");
    }

    pub fn inc_generation_retries(&self) {
        self.generation_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "generation_retries", "counter incremented");
    }

    pub fn inc_events_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_emitted", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            candidates_started: self.candidates_started.load(Ordering::Relaxed),
            candidates_failed: self.candidates_failed.load(Ordering::Relaxed),
            generation_retries: self.generation_retries.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
        }
    }

    /// Log current values as one `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            candidates_started = s.candidates_started,
            candidates_failed = s.candidates_failed,
            generation_retries = s.generation_retries,
            events_emitted = s.events_emitted,
        );
    }

    /// Zero every counter. Tests only; counters are shared process-wide.
    pub fn reset(&self) {
        for counter in [
            &self.candidates_started,
            &self.candidates_failed,
            &self.generation_retries,
            &self.events_emitted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
