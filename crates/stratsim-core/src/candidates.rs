//! Bounded-concurrency fan-out of independent round loops.
//!
//! Permits are acquired in submission order before each task is spawned, so
//! queued candidates start in the order they were submitted and at most
//! `worker_capacity` loops are in flight at once. Once the run is cancelled no
//! further task is spawned.

use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use tracing::{instrument, warn, Instrument};

use crate::config::MAX_SIMULATIONS;
use crate::domain::{Candidate, RunState, TerminalState};
use crate::metrics::METRICS;
use crate::obs;
use crate::round_loop::{cancelled_before_start, run_candidate, LoopContext};
use crate::scoring::ScoringPolicy;

pub struct CandidateManager {
    ctx: LoopContext,
    worker_capacity: usize,
    policy: Arc<dyn ScoringPolicy>,
    state: Arc<RwLock<RunState>>,
}

impl CandidateManager {
    pub fn new(
        ctx: LoopContext,
        worker_capacity: usize,
        policy: Arc<dyn ScoringPolicy>,
        state: Arc<RwLock<RunState>>,
    ) -> Self {
        Self {
            ctx,
            worker_capacity: worker_capacity.max(1),
            policy,
            state,
        }
    }

    /// Run `num_candidates` (capped at 100) loops and return them all,
    /// terminal, in submission order.
    ///
    /// Each finished candidate is scored, forecast and inserted into the
    /// shared run state as soon as it terminates. A failing or panicking
    /// candidate never aborts its siblings.
    #[instrument(skip(self), fields(run_id = %self.ctx.run_id))]
    pub async fn run(&self, num_candidates: u32, max_rounds: u32) -> Vec<Candidate> {
        let count = num_candidates.min(MAX_SIMULATIONS) as usize;
        let sem = Arc::new(Semaphore::new(self.worker_capacity));
        let mut tasks = Vec::with_capacity(count);

        for idx in 0..count {
            let permit = match Arc::clone(&sem).acquire_owned().await {
                Ok(p) => p,
                // The semaphore is never closed.
                Err(_) => break,
            };
            if self.ctx.cancelled() {
                break;
            }
            let ctx = self.ctx.clone();
            let policy = Arc::clone(&self.policy);
            let state = Arc::clone(&self.state);

            let task = tokio::spawn(async move {
                let _permit = permit;
                METRICS.inc_candidates_started();
                let candidate = run_candidate(&ctx, Candidate::id_for(idx), idx, max_rounds).await;
                record(&ctx.run_id, candidate, policy.as_ref(), &state).await
            }
            .in_current_span());
            tasks.push(task);
        }

        let spawned = tasks.len();
        let joined = futures::future::join_all(tasks).await;
        let mut finished = Vec::with_capacity(joined.len());
        for (idx, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(candidate) => finished.push(candidate),
                Err(e) => {
                    warn!(candidate_id = %Candidate::id_for(idx), error = %e, "candidate task panicked");
                    let mut candidate = Candidate::empty(idx, max_rounds, TerminalState::Failed);
                    candidate.failure = Some(format!("candidate task aborted: {e}"));
                    finished.push(
                        record(&self.ctx.run_id, candidate, self.policy.as_ref(), &self.state).await,
                    );
                }
            }
        }

        for idx in spawned..count {
            let candidate = cancelled_before_start(&self.ctx, idx, max_rounds);
            finished.push(record(&self.ctx.run_id, candidate, self.policy.as_ref(), &self.state).await);
        }
        finished
    }
}

async fn record(
    run_id: &str,
    mut candidate: Candidate,
    policy: &dyn ScoringPolicy,
    state: &RwLock<RunState>,
) -> Candidate {
    candidate.score = policy.score(&candidate);
    candidate.forecast = Some(policy.forecast(&candidate));
    if candidate.terminal_state == TerminalState::Failed {
        METRICS.inc_candidates_failed();
    }
    obs::emit_candidate_finished(
        run_id,
        &candidate.candidate_id,
        &candidate.terminal_state.to_string(),
        candidate.rounds_used(),
        candidate.score,
    );
    state
        .write()
        .await
        .candidates
        .insert(candidate.candidate_id.clone(), candidate.clone());
    candidate
}
