//! End-to-end runs through the orchestrator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stratsim_core::{
    AgentContext, CheckStatus, CheckboxStatus, ContentGenerator, Draft, EngineConfig, EventType,
    Generation, GenerationError, HeuristicGenerator, MemoryRunStore, Orchestrator, Phase,
    ProjectBrief, RetryPolicy, ReviewResult, Role, RunInputs, RunStatus, SimulationConfig,
    TerminalState, Verdict,
};
use tokio::sync::broadcast::error::RecvError;

fn fast_engine() -> EngineConfig {
    EngineConfig {
        worker_capacity: 3,
        retry: RetryPolicy {
            max_retries: 0,
            backoff_base_ms: 1,
            timeout_ms: 5_000,
        },
        ..EngineConfig::default()
    }
}

fn heuristic_inputs(num_simulations: u32, max_rounds: u32, top_candidates: u32) -> RunInputs {
    let mut inputs = RunInputs::new("proj-e2e");
    inputs.brief = ProjectBrief {
        title: Some("Rural Resilience Programme".into()),
        country: Some("Kenya".into()),
        user_notes: "Focus on irrigation and youth employment.".into(),
    };
    inputs.config = SimulationConfig {
        num_simulations,
        max_rounds,
        top_candidates,
        ..SimulationConfig::default()
    };
    inputs.internal_materials = vec![
        (
            "targeting_policy.md".into(),
            "Targeting should reach poor rural households, women and youth through community groups.".into(),
        ),
        (
            "climate_strategy.md".into(),
            "Climate adaptation investments focus on water harvesting and drought tolerant crops.".into(),
        ),
    ];
    inputs.uploads = vec![(
        "country_note.md".into(),
        "Smallholder farmers in arid counties face recurrent drought and weak market access.".into(),
    )];
    inputs
}

/// Writer drafts quickly (optionally slowly); reviewer accepts from
/// `accept_at`; writers of `failing` candidates always error.
struct Scripted {
    accept_at: u32,
    failing: Vec<String>,
    write_delay: Duration,
}

impl Scripted {
    fn accepting_at(accept_at: u32) -> Self {
        Self {
            accept_at,
            failing: Vec::new(),
            write_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ContentGenerator for Scripted {
    async fn generate(&self, role: &Role, ctx: &AgentContext) -> Result<Generation, GenerationError> {
        match role {
            Role::Writer => {
                tokio::time::sleep(self.write_delay).await;
                if self.failing.iter().any(|id| id == &ctx.candidate_id) {
                    return Err(GenerationError::Unavailable("writer offline".into()));
                }
                Ok(Generation::Draft(Draft::new(
                    ctx.candidate_id.clone(),
                    ctx.round_number,
                    format!("draft {} round {}", ctx.candidate_id, ctx.round_number),
                    ctx.evidence.iter().map(|e| e.chunk_id.clone()).collect(),
                )))
            }
            Role::Reviewer => {
                let pass = ctx.round_number >= self.accept_at;
                let status = if pass { CheckStatus::True } else { CheckStatus::False };
                Ok(Generation::Review(ReviewResult {
                    candidate_id: ctx.candidate_id.clone(),
                    round_number: ctx.round_number,
                    checklist: vec![CheckboxStatus::new("structure", "Structure", status, "scripted")],
                    comments: vec![],
                    metrics: Vec::new(),
                    verdict: if pass { Verdict::Accept } else { Verdict::Revise },
                }))
            }
            Role::Stakeholder(_) => Err(GenerationError::Unavailable("not consulted".into())),
        }
    }
}

#[tokio::test]
async fn test_heuristic_run_completes_and_ranks() {
    let orch = Orchestrator::new(
        fast_engine(),
        Arc::new(HeuristicGenerator::default()),
        Arc::new(MemoryRunStore::new()),
    );
    let run_id = orch.start(heuristic_inputs(5, 2, 3)).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.candidates.len(), 5);
    assert_eq!(state.selected_candidates.len(), 3);
    for candidate in state.candidates.values() {
        assert!(candidate.terminal_state.is_completed());
        assert!(candidate.rounds_used() >= 1 && candidate.rounds_used() <= 2);
        assert!(candidate.forecast.is_some());
    }

    // cand_001 passes its first review; cand_004 lacks a required section first.
    assert_eq!(state.candidates["cand_001"].rounds_used(), 1);
    assert_eq!(state.candidates["cand_001"].terminal_state, TerminalState::Accepted);
    assert_eq!(state.candidates["cand_004"].rounds_used(), 2);

    let scores: Vec<f64> = state
        .selected_candidates
        .iter()
        .map(|id| state.candidates[id].score)
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(state.top_candidate().unwrap().candidate_id, state.selected_candidates[0]);
}

#[tokio::test]
async fn test_event_stream_is_gapless_and_framed_by_status() {
    let orch = Orchestrator::new(
        fast_engine(),
        Arc::new(HeuristicGenerator::default()),
        Arc::new(MemoryRunStore::new()),
    );
    let run_id = orch.start(heuristic_inputs(4, 2, 2)).await.unwrap();
    orch.wait(&run_id).await.unwrap();

    let events = orch.events(&run_id, 0);
    assert!(!events.is_empty());
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.event_id, i as u64);
        assert_eq!(event.run_id, run_id);
    }

    assert_eq!(events[0].event_type, EventType::RunStatus);
    assert_eq!(events[0].payload["status"], "running");
    assert_eq!(events[1].event_type, EventType::GraphUpdate);
    assert!(events[1].payload["edges"].is_array());

    let last = events.last().unwrap();
    assert_eq!(last.event_type, EventType::RunStatus);
    assert_eq!(last.payload["status"], "completed");

    let drafts = events
        .iter()
        .filter(|e| e.event_type == EventType::DraftCreated)
        .count();
    let reviews = events
        .iter()
        .filter(|e| e.event_type == EventType::ReviewResult)
        .count();
    assert_eq!(drafts, reviews);
    assert!(drafts >= 4);

    // Replay from the middle returns the tail unchanged.
    let tail = orch.events(&run_id, 5);
    assert_eq!(tail.first().unwrap().event_id, 5);
    assert_eq!(tail.len(), events.len() - 5);
}

#[tokio::test]
async fn test_always_revise_exhausts_rounds() {
    let orch = Orchestrator::new(
        fast_engine(),
        Arc::new(Scripted::accepting_at(u32::MAX)),
        Arc::new(MemoryRunStore::new()),
    );
    let mut inputs = heuristic_inputs(2, 3, 2);
    inputs.config.max_rounds = 3;
    let run_id = orch.start(inputs).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    for candidate in state.candidates.values() {
        assert_eq!(candidate.terminal_state, TerminalState::RevisionExhausted);
        assert_eq!(candidate.rounds_used(), 3);
        assert_eq!(candidate.forecast.as_ref().unwrap().phase, Phase::AtRisk);
    }
    assert_eq!(state.selected_candidates, vec!["cand_001", "cand_002"]);
}

#[tokio::test]
async fn test_partial_failure_completes_with_fewer_selected() {
    let gen = Scripted {
        failing: vec!["cand_001".into(), "cand_003".into()],
        ..Scripted::accepting_at(1)
    };
    let orch = Orchestrator::new(fast_engine(), Arc::new(gen), Arc::new(MemoryRunStore::new()));
    let run_id = orch.start(heuristic_inputs(3, 2, 3)).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.selected_candidates, vec!["cand_002"]);
    assert_eq!(state.candidates["cand_001"].terminal_state, TerminalState::Failed);
    assert!(state.candidates["cand_001"].failure.is_some());
}

#[tokio::test]
async fn test_all_candidates_failing_fails_run() {
    let gen = Scripted {
        failing: (1..=3).map(|i| format!("cand_{i:03}")).collect(),
        ..Scripted::accepting_at(1)
    };
    let orch = Orchestrator::new(fast_engine(), Arc::new(gen), Arc::new(MemoryRunStore::new()));
    let run_id = orch.start(heuristic_inputs(3, 2, 1)).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.selected_candidates.is_empty());
    assert!(state.error.unwrap().contains("all 3 candidates failed"));
}

#[tokio::test]
async fn test_cancel_keeps_reviewed_candidates_selectable() {
    let gen = Scripted {
        write_delay: Duration::from_millis(30),
        ..Scripted::accepting_at(u32::MAX)
    };
    let orch = Orchestrator::new(fast_engine(), Arc::new(gen), Arc::new(MemoryRunStore::new()));
    let mut rx = orch.subscribe();
    let run_id = orch.start(heuristic_inputs(3, 6, 1)).await.unwrap();

    // Cancel once every candidate has a reviewed round.
    let mut reviewed = HashSet::new();
    while reviewed.len() < 3 {
        match rx.recv().await {
            Ok(event) if event.event_type == EventType::ReviewResult => {
                reviewed.insert(event.payload["candidate_id"].as_str().unwrap().to_string());
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => panic!("event stream closed before cancellation"),
        }
    }
    orch.cancel(&run_id).await.unwrap();
    let state = orch.wait(&run_id).await.unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.selected_candidates.len(), 1);
    for candidate in state.candidates.values() {
        assert_eq!(candidate.terminal_state, TerminalState::Cancelled);
        assert!(candidate.rounds_used() >= 1 && candidate.rounds_used() < 6);
        assert_eq!(candidate.terminal_review().unwrap().metrics.len(), 5);
    }
}

#[tokio::test]
async fn test_live_subscriber_sees_run_events() {
    let orch = Orchestrator::new(
        fast_engine(),
        Arc::new(Scripted::accepting_at(1)),
        Arc::new(MemoryRunStore::new()),
    );
    let mut rx = orch.subscribe();
    let run_id = orch.start(heuristic_inputs(1, 1, 1)).await.unwrap();
    orch.wait(&run_id).await.unwrap();

    let first = rx.recv().await.unwrap();
    assert_eq!(first.run_id, run_id);
    assert_eq!(first.event_id, 0);
}
