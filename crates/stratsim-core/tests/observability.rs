//! Observability tests for the run lifecycle.
//!
//! These exercise the structured tracing events emitted at the lifecycle
//! points (run start, candidate termination, run finish, persistence
//! failure) under a capturing subscriber. Emission must never panic or
//! disturb the run outcome, and each event must reach the subscriber.

use std::sync::Arc;

use stratsim_core::obs::{
    emit_candidate_finished, emit_persistence_error, emit_run_finished, emit_run_started, RunSpan,
};
use stratsim_core::metrics::METRICS;
use stratsim_core::persistence::FailingRunStore;
use stratsim_core::{
    EngineConfig, HeuristicGenerator, MemoryRunStore, Orchestrator, RunInputs, RunStatus,
};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_logs_ids() {
    emit_run_started("run-123", "proj-9", 3, 2);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("proj-9"));
}

#[traced_test]
#[test]
fn test_emit_candidate_finished_logs_state() {
    emit_candidate_finished("run-1", "cand_002", "accepted", 1, 0.95);
    assert!(logs_contain("candidate.finished"));
    assert!(logs_contain("cand_002"));
}

#[traced_test]
#[test]
fn test_emit_run_finished_logs_status() {
    emit_run_finished("run-456", 5000, 42, "completed");
    assert!(logs_contain("run.finished"));
}

#[traced_test]
#[test]
fn test_emit_persistence_error_logs_warning() {
    emit_persistence_error("run-err-001", "run_state", &"disk full");
    assert!(logs_contain("persistence.error"));
    assert!(logs_contain("disk full"));
}

#[traced_test]
#[test]
fn test_counter_increments_are_traced() {
    METRICS.inc_candidates_started();
    METRICS.inc_candidates_failed();
    METRICS.inc_generation_retries();
    METRICS.inc_events_emitted();
    for metric in [
        "candidates_started",
        "candidates_failed",
        "generation_retries",
        "events_emitted",
    ] {
        assert!(logs_contain(metric), "{metric}");
    }
}

#[traced_test]
#[test]
fn test_run_span_enter_creates_span() {
    let span = RunSpan::enter("test-span-run");
    drop(span);
}

fn inputs() -> RunInputs {
    let mut inputs = RunInputs::new("proj-obs");
    inputs.uploads = vec![(
        "note.md".into(),
        "Drought and market access constrain smallholder incomes.".into(),
    )];
    inputs.config.num_simulations = 2;
    inputs
}

#[traced_test]
#[tokio::test]
async fn test_run_emits_lifecycle_events() {
    let orch = Orchestrator::new(
        EngineConfig::default(),
        Arc::new(HeuristicGenerator::default()),
        Arc::new(MemoryRunStore::new()),
    );
    let run_id = orch.start(inputs()).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("candidate.finished"));
    assert!(logs_contain("run.finished"));
}

#[traced_test]
#[tokio::test]
async fn test_failing_store_logs_persistence_errors() {
    let orch = Orchestrator::new(
        EngineConfig::default(),
        Arc::new(HeuristicGenerator::default()),
        Arc::new(FailingRunStore),
    );
    let run_id = orch.start(inputs()).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert!(logs_contain("persistence.error"));
}
