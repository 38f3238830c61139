//! Structured observability hooks for the run lifecycle.
//!
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for key lifecycle points: run start, candidate
//!   termination, run finish, persistence failure

use tracing::info;

/// RAII guard that enters a run-scoped tracing span.
///
/// Only use on a single thread of execution; async tasks should use
/// [`run_span`] with `Instrument` instead.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(run_id: &str) -> Self {
        Self {
            _span: run_span(run_id).entered(),
        }
    }
}

/// Span tagged with the run id, for instrumenting run futures.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("stratsim.run", run_id = %run_id)
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, project_id: &str, num_simulations: u32, max_rounds: u32) {
    info!(
        event = "run.started",
        run_id = %run_id,
        project_id = %project_id,
        num_simulations = num_simulations,
        max_rounds = max_rounds,
    );
}

/// Emit event: a candidate reached a terminal state.
pub fn emit_candidate_finished(
    run_id: &str,
    candidate_id: &str,
    terminal_state: &str,
    rounds: u32,
    score: f64,
) {
    info!(
        event = "candidate.finished",
        run_id = %run_id,
        candidate_id = %candidate_id,
        terminal_state = %terminal_state,
        rounds = rounds,
        score = score,
    );
}

/// Emit event: run finished with duration, total events and final status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, total_events: u64, status: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        total_events = total_events,
        status = %status,
    );
}

/// Emit event: best-effort persistence write failed (warning level).
pub fn emit_persistence_error(run_id: &str, target: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "persistence.error", run_id = %run_id, target = %target, error = %error);
}
