//! Per-candidate writer/reviewer state machine.
//!
//! ```text
//! Drafting -> Reviewing -> Accepted
//!                       -> Revising -> Drafting (next round)
//!                       -> RevisionExhausted
//! any step -> Failed | Cancelled
//! ```
//!
//! Rounds within a candidate are strictly sequential. Every transition emits
//! a `round_update`; the draft and review of a round emit `draft_created` and
//! `review_result` before the transition that follows them.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::agent::profiles::{instruction_for, node_status, scopes_for, NodeStatus};
use crate::agent::{
    Agent, AgentContext, EvidenceExcerpt, ProjectBrief, Role, StakeholderGroup, StakeholderNotes,
    STAKEHOLDERS,
};
use crate::config::OutputType;
use crate::domain::{Candidate, Draft, EventType, Round, Severity, TerminalState};
use crate::events::{EventEmitter, LogLevel};
use crate::evidence::{review_metrics, EvidenceIndex};
use crate::obs;
use crate::persistence::RunStore;

/// Round loop position, as reported in `round_update` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Drafting,
    Reviewing,
    Revising,
    Accepted,
    RevisionExhausted,
    Failed,
    Cancelled,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Drafting => "drafting",
            LoopState::Reviewing => "reviewing",
            LoopState::Revising => "revising",
            LoopState::Accepted => "accepted",
            LoopState::RevisionExhausted => "revision_exhausted",
            LoopState::Failed => "failed",
            LoopState::Cancelled => "cancelled",
        }
    }
}

/// Shared, read-only collaborators for every candidate of one run.
#[derive(Clone)]
pub struct LoopContext {
    pub run_id: String,
    pub brief: ProjectBrief,
    pub output_type: OutputType,
    pub evidence_top_k: usize,
    pub index: Arc<EvidenceIndex>,
    pub agent: Agent,
    pub emitter: Arc<EventEmitter>,
    pub store: Arc<dyn RunStore>,
    /// Flips to `true` when the run is cancelled.
    pub cancel: watch::Receiver<bool>,
}

impl LoopContext {
    pub(crate) fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn retrieve(&self, role: &Role) -> Vec<EvidenceExcerpt> {
        let query = match self.brief.title.as_deref() {
            Some(title) => format!("{} {}", role.retrieval_query(), title),
            None => role.retrieval_query().to_string(),
        };
        self.index
            .query_scoped(&query, self.evidence_top_k, &scopes_for(role))
            .into_iter()
            .filter_map(|hit| {
                self.index.chunk(&hit.chunk_id).map(|c| EvidenceExcerpt {
                    chunk_id: c.id.clone(),
                    source_name: c.source_name.clone(),
                    text: c.text.clone(),
                    score: hit.score,
                })
            })
            .collect()
    }

    fn agent_context(&self, role: &Role, candidate_id: &str, round: u32) -> AgentContext {
        let mut ctx = AgentContext::new(candidate_id, round, self.output_type);
        ctx.brief = self.brief.clone();
        ctx.instruction = instruction_for(role);
        ctx.evidence = self.retrieve(role);
        ctx
    }

    fn round_update(&self, candidate_id: &str, round: u32, state: LoopState) {
        self.emitter.emit(
            &self.run_id,
            EventType::RoundUpdate,
            json!({"candidate_id": candidate_id, "round": round, "state": state.as_str()}),
        );
    }

    fn graph(&self, nodes: &[&str], status: NodeStatus) {
        self.emitter
            .emit(&self.run_id, EventType::GraphUpdate, node_status(nodes, status));
    }
}

/// Drive one candidate to a terminal state.
///
/// The returned candidate carries its rounds and terminal state; score and
/// forecast are left for the candidate manager.
#[instrument(skip(ctx), fields(run_id = %ctx.run_id))]
pub async fn run_candidate(
    ctx: &LoopContext,
    candidate_id: String,
    submission_index: usize,
    max_rounds: u32,
) -> Candidate {
    let mut candidate = Candidate {
        candidate_id: candidate_id.clone(),
        submission_index,
        max_rounds,
        rounds: Vec::new(),
        terminal_state: TerminalState::Failed,
        score: 0.0,
        forecast: None,
        failure: None,
    };

    if ctx.cancelled() {
        return stop(ctx, candidate, 1);
    }
    let guidance = consult_stakeholders(ctx, &candidate_id).await;
    let mut revision_notes: Option<String> = None;
    let mut prior_draft: Option<Draft> = None;

    for round in 1..=max_rounds {
        if ctx.cancelled() {
            return stop(ctx, candidate, round);
        }

        // Drafting
        ctx.round_update(&candidate_id, round, LoopState::Drafting);
        ctx.graph(&Role::Writer.node_ids(), NodeStatus::Writing);
        let mut writer_ctx = ctx.agent_context(&Role::Writer, &candidate_id, round);
        writer_ctx.guidance = guidance.clone();
        writer_ctx.revision_notes = revision_notes.take();
        writer_ctx.prior_draft = prior_draft.take();

        let draft = match ctx.agent.write(&writer_ctx).await {
            Ok(d) => d,
            Err(e) => return fail(ctx, candidate, round, e.to_string()),
        };
        ctx.graph(&Role::Writer.node_ids(), NodeStatus::Idle);

        if let Err(e) = ctx
            .store
            .save_draft(&ctx.run_id, &candidate_id, round, &draft)
            .await
        {
            obs::emit_persistence_error(&ctx.run_id, "draft", &e);
        }
        check_citations(ctx, &draft);
        ctx.emitter.emit(
            &ctx.run_id,
            EventType::DraftCreated,
            json!({
                "candidate_id": candidate_id,
                "round": round,
                "digest": draft.digest,
                "word_count": draft.word_count(),
                "cited_evidence_ids": draft.cited_evidence_ids,
            }),
        );

        // Reviewing
        ctx.round_update(&candidate_id, round, LoopState::Reviewing);
        ctx.graph(&Role::Reviewer.node_ids(), NodeStatus::Reviewing);
        let mut reviewer_ctx = ctx.agent_context(&Role::Reviewer, &candidate_id, round);
        reviewer_ctx.prior_draft = Some(draft.clone());

        let mut review = match ctx.agent.review(&reviewer_ctx).await {
            Ok(r) => r,
            Err(e) => return fail(ctx, candidate, round, e.to_string()),
        };
        ctx.graph(&Role::Reviewer.node_ids(), NodeStatus::Idle);
        review.metrics = review_metrics(&ctx.index, &draft, &review);

        if let Err(e) = ctx
            .store
            .save_review(&ctx.run_id, &candidate_id, round, &review)
            .await
        {
            obs::emit_persistence_error(&ctx.run_id, "review", &e);
        }
        ctx.emitter.emit(
            &ctx.run_id,
            EventType::ReviewResult,
            json!({
                "candidate_id": candidate_id,
                "round": round,
                "verdict": review.verdict,
                "checklist_fraction": review.checklist_fraction(),
                "blockers": review.count_severity(Severity::Blocker),
                "metric_mean": review.metric_mean(),
                "review": review,
            }),
        );

        let acceptable = review.is_acceptable();
        let notes = review.revision_notes();
        candidate.rounds.push(Round {
            draft: draft.clone(),
            review,
        });

        if acceptable {
            ctx.round_update(&candidate_id, round, LoopState::Accepted);
            candidate.terminal_state = TerminalState::Accepted;
            return candidate;
        }
        if round == max_rounds {
            ctx.round_update(&candidate_id, round, LoopState::RevisionExhausted);
            candidate.terminal_state = TerminalState::RevisionExhausted;
            return candidate;
        }

        ctx.round_update(&candidate_id, round, LoopState::Revising);
        debug!(candidate_id = %candidate_id, round, "revision requested");
        revision_notes = Some(notes);
        prior_draft = Some(draft);
    }

    // Only reachable with max_rounds == 0, which clamping prevents.
    candidate.terminal_state = TerminalState::RevisionExhausted;
    candidate
}

/// Candidate skipped by the fan-out because the run was already cancelled.
pub(crate) fn cancelled_before_start(
    ctx: &LoopContext,
    submission_index: usize,
    max_rounds: u32,
) -> Candidate {
    stop(
        ctx,
        Candidate::empty(submission_index, max_rounds, TerminalState::Cancelled),
        1,
    )
}

/// Ends the candidate `Cancelled` before `round` starts. Completed rounds are kept.
fn stop(ctx: &LoopContext, mut candidate: Candidate, round: u32) -> Candidate {
    debug!(candidate_id = %candidate.candidate_id, round, "candidate stopped by cancellation");
    ctx.round_update(&candidate.candidate_id, round, LoopState::Cancelled);
    candidate.terminal_state = TerminalState::Cancelled;
    candidate
}

fn fail(ctx: &LoopContext, mut candidate: Candidate, round: u32, error: String) -> Candidate {
    warn!(candidate_id = %candidate.candidate_id, round, error = %error, "candidate failed");
    ctx.round_update(&candidate.candidate_id, round, LoopState::Failed);
    ctx.emitter.log(
        &ctx.run_id,
        LogLevel::Error,
        "round_loop",
        "candidate failed",
        json!({"candidate_id": candidate.candidate_id, "round": round, "error": error}),
    );
    candidate.terminal_state = TerminalState::Failed;
    candidate.failure = Some(error);
    candidate
}

/// Every cited id must resolve in the run's index; each one that does not is
/// surfaced as a warning event and kept in the draft.
fn check_citations(ctx: &LoopContext, draft: &Draft) {
    for id in draft
        .cited_evidence_ids
        .iter()
        .filter(|id| !ctx.index.contains(id))
    {
        warn!(candidate_id = %draft.candidate_id, chunk_id = %id, "draft cites unknown evidence");
        ctx.emitter.log(
            &ctx.run_id,
            LogLevel::Warn,
            "round_loop",
            "draft cites evidence missing from the index",
            json!({
                "candidate_id": draft.candidate_id,
                "round": draft.round_number,
                "chunk_id": id,
            }),
        );
    }
}

/// Government first, then the country team. Failures are logged and skipped.
/// Cancellation is checked before each stakeholder.
async fn consult_stakeholders(ctx: &LoopContext, candidate_id: &str) -> Vec<StakeholderNotes> {
    let mut guidance = Vec::new();
    for group in [StakeholderGroup::Government, StakeholderGroup::CountryTeam] {
        if ctx.cancelled() {
            break;
        }
        let members: Vec<_> = STAKEHOLDERS.iter().filter(|s| s.group() == group).collect();
        let nodes: Vec<&str> = members.iter().map(|s| s.node_id()).collect();
        ctx.graph(&nodes, NodeStatus::Consulting);

        for stakeholder in members {
            if ctx.cancelled() {
                break;
            }
            let role = Role::Stakeholder(*stakeholder);
            let mut sctx = ctx.agent_context(&role, candidate_id, 1);
            sctx.guidance = guidance.clone();
            match ctx.agent.consult(*stakeholder, &sctx).await {
                Ok(notes) => guidance.push(notes),
                Err(e) => {
                    ctx.emitter.log(
                        &ctx.run_id,
                        LogLevel::Warn,
                        stakeholder.node_id(),
                        "stakeholder consultation failed",
                        json!({"candidate_id": candidate_id, "error": e.to_string()}),
                    );
                }
            }
        }
        ctx.graph(&nodes, NodeStatus::Idle);
    }
    guidance
}
