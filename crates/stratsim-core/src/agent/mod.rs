//! Role-parameterized content producers.
//!
//! A [`ContentGenerator`] is the pluggable backend (a language model client,
//! or the deterministic [`HeuristicGenerator`]). [`Agent`] wraps one with the
//! retry policy and checks that each role got the output shape it requires.

pub mod heuristic;
pub mod profiles;
pub mod roles;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use crate::domain::{Draft, GenerationError, ReviewResult};
use crate::retry::{with_retry, RetryPolicy};

pub use heuristic::HeuristicGenerator;
pub use profiles::{AgentProfile, NodeStatus, PROFILES};
pub use roles::{
    AgentContext, EvidenceExcerpt, Generation, ProjectBrief, Role, StakeholderGroup,
    StakeholderId, StakeholderNotes, STAKEHOLDERS,
};

/// Backend that produces a draft, a review, or stakeholder notes for a role.
///
/// Implementations must not emit events or persist anything; the round loop
/// does both on their behalf.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, role: &Role, ctx: &AgentContext) -> Result<Generation, GenerationError>;
}

/// Retrying, shape-checking front for a [`ContentGenerator`].
#[derive(Clone)]
pub struct Agent {
    generator: Arc<dyn ContentGenerator>,
    retry: RetryPolicy,
}

impl Agent {
    pub fn new(generator: Arc<dyn ContentGenerator>, retry: RetryPolicy) -> Self {
        Self { generator, retry }
    }

    /// Writer turn. The draft must belong to the context's candidate and round.
    #[instrument(skip(self, ctx), fields(candidate_id = %ctx.candidate_id, round = ctx.round_number))]
    pub async fn write(&self, ctx: &AgentContext) -> Result<Draft, GenerationError> {
        let label = format!("{}:writer:{}", ctx.candidate_id, ctx.round_number);
        with_retry(&self.retry, &label, move || async move {
            match self.generator.generate(&Role::Writer, ctx).await? {
                Generation::Draft(draft) => {
                    check_owner(&draft.candidate_id, draft.round_number, ctx)?;
                    Ok(draft)
                }
                other => Err(wrong_shape(&Role::Writer, &other)),
            }
        })
        .await
    }

    /// Reviewer turn over `ctx.prior_draft`. The review must reference that
    /// draft's round number.
    #[instrument(skip(self, ctx), fields(candidate_id = %ctx.candidate_id, round = ctx.round_number))]
    pub async fn review(&self, ctx: &AgentContext) -> Result<ReviewResult, GenerationError> {
        let reviewed_round = ctx
            .prior_draft
            .as_ref()
            .map(|d| d.round_number)
            .ok_or_else(|| GenerationError::Malformed("review requested without a draft".into()))?;

        let label = format!("{}:reviewer:{}", ctx.candidate_id, ctx.round_number);
        with_retry(&self.retry, &label, move || async move {
            match self.generator.generate(&Role::Reviewer, ctx).await? {
                Generation::Review(review) => {
                    if review.round_number != reviewed_round {
                        return Err(GenerationError::Malformed(format!(
                            "review references round {} but draft is round {}",
                            review.round_number, reviewed_round
                        )));
                    }
                    check_owner(&review.candidate_id, review.round_number, ctx)?;
                    Ok(review)
                }
                other => Err(wrong_shape(&Role::Reviewer, &other)),
            }
        })
        .await
    }

    /// Stakeholder consult.
    #[instrument(skip(self, ctx), fields(candidate_id = %ctx.candidate_id, stakeholder = %stakeholder))]
    pub async fn consult(
        &self,
        stakeholder: StakeholderId,
        ctx: &AgentContext,
    ) -> Result<StakeholderNotes, GenerationError> {
        let role = &Role::Stakeholder(stakeholder);
        let label = format!("{}:{}", ctx.candidate_id, role);
        with_retry(&self.retry, &label, move || async move {
            match self.generator.generate(role, ctx).await? {
                Generation::Notes(notes) if notes.stakeholder == stakeholder => Ok(notes),
                Generation::Notes(notes) => Err(GenerationError::Malformed(format!(
                    "notes from {} returned for {}",
                    notes.stakeholder, stakeholder
                ))),
                other => Err(wrong_shape(role, &other)),
            }
        })
        .await
    }
}

fn check_owner(candidate_id: &str, round: u32, ctx: &AgentContext) -> Result<(), GenerationError> {
    if candidate_id != ctx.candidate_id || round != ctx.round_number {
        return Err(GenerationError::Malformed(format!(
            "output for {candidate_id} round {round}, expected {} round {}",
            ctx.candidate_id, ctx.round_number
        )));
    }
    Ok(())
}

fn wrong_shape(role: &Role, got: &Generation) -> GenerationError {
    GenerationError::Malformed(format!("{role} returned {}", got.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputType;
    use crate::domain::{CheckStatus, CheckboxStatus, Verdict};

    struct Fixed(Generation);

    #[async_trait]
    impl ContentGenerator for Fixed {
        async fn generate(&self, _role: &Role, _ctx: &AgentContext) -> Result<Generation, GenerationError> {
            Ok(self.0.clone())
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            backoff_base_ms: 1,
            timeout_ms: 1_000,
        }
    }

    fn review_for(round: u32) -> ReviewResult {
        ReviewResult {
            candidate_id: "cand_001".into(),
            round_number: round,
            checklist: vec![CheckboxStatus::new("x", "x", CheckStatus::True, "ok")],
            comments: vec![],
            metrics: Vec::new(),
            verdict: Verdict::Accept,
        }
    }

    #[tokio::test]
    async fn test_writer_returns_draft() {
        let draft = Draft::new("cand_001", 1, "body", vec![]);
        let agent = Agent::new(Arc::new(Fixed(Generation::Draft(draft.clone()))), no_retry());
        let ctx = AgentContext::new("cand_001", 1, OutputType::Cosop);
        assert_eq!(agent.write(&ctx).await.unwrap(), draft);
    }

    #[tokio::test]
    async fn test_writer_rejects_review_output() {
        let agent = Agent::new(Arc::new(Fixed(Generation::Review(review_for(1)))), no_retry());
        let ctx = AgentContext::new("cand_001", 1, OutputType::Cosop);
        let err = agent.write(&ctx).await.unwrap_err();
        match err {
            GenerationError::Exhausted { last_error, .. } => {
                assert!(last_error.contains("writer returned review"), "{last_error}")
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reviewer_round_must_match_draft() {
        let agent = Agent::new(Arc::new(Fixed(Generation::Review(review_for(1)))), no_retry());
        let mut ctx = AgentContext::new("cand_001", 2, OutputType::Cosop);
        ctx.prior_draft = Some(Draft::new("cand_001", 2, "body", vec![]));
        assert!(agent.review(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_reviewer_needs_a_draft() {
        let agent = Agent::new(Arc::new(Fixed(Generation::Review(review_for(1)))), no_retry());
        let ctx = AgentContext::new("cand_001", 1, OutputType::Cosop);
        assert!(matches!(
            agent.review(&ctx).await,
            Err(GenerationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_consult_checks_stakeholder() {
        let notes = StakeholderNotes {
            stakeholder: StakeholderId::GovMoa,
            notes: "- priorities".into(),
            cited_evidence_ids: vec![],
        };
        let agent = Agent::new(Arc::new(Fixed(Generation::Notes(notes.clone()))), no_retry());
        let ctx = AgentContext::new("cand_001", 1, OutputType::Cosop);
        assert_eq!(agent.consult(StakeholderId::GovMoa, &ctx).await.unwrap(), notes);
        assert!(agent.consult(StakeholderId::GovMof, &ctx).await.is_err());
    }
}
