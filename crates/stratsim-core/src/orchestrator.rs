//! Run orchestrator: owns the run registry and drives each run end to end.
//!
//! A run builds its evidence index once, fans out candidates through the
//! [`CandidateManager`], selects the top-K, and persists the final
//! [`RunState`]. `start` returns as soon as the run is registered; callers
//! observe progress through [`Orchestrator::status`], the event log, or
//! [`Orchestrator::wait`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{error, info, instrument, Instrument};
use uuid::Uuid;

use crate::agent::profiles::topology;
use crate::agent::{Agent, ContentGenerator, ProjectBrief};
use crate::candidates::CandidateManager;
use crate::config::{EngineConfig, SimulationConfig};
use crate::domain::{
    EventType, Result, RunEvent, RunState, RunStatus, SimError, TerminalState, ValidationError,
};
use crate::events::{BroadcastSink, EventEmitter, EventSink, LogLevel};
use crate::evidence::{EvidenceIndex, INTERNAL_SCOPE, PROJECT_SCOPE};
use crate::metrics::METRICS;
use crate::obs;
use crate::persistence::RunStore;
use crate::round_loop::LoopContext;
use crate::scoring::{select, DefaultScoringPolicy, ScoringPolicy};

/// Documents from one knowledge-base folder, tagged with that folder's scopes.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBatch {
    pub scopes: Vec<String>,
    /// `(source_name, text)` chunks.
    pub chunks: Vec<(String, String)>,
}

impl KnowledgeBatch {
    pub fn new<S: Into<String>>(scopes: impl IntoIterator<Item = S>) -> Self {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            chunks: Vec::new(),
        }
    }
}

/// Everything a run needs from its caller.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub project_id: String,
    pub brief: ProjectBrief,
    pub config: SimulationConfig,
    /// `(source_name, text)` chunks ingested first.
    pub internal_materials: Vec<(String, String)>,
    /// Scoped knowledge-base batches, ingested after the internal materials.
    pub knowledge_base: Vec<KnowledgeBatch>,
    /// `(source_name, text)` chunks ingested after the internal materials.
    pub uploads: Vec<(String, String)>,
}

impl RunInputs {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::InvalidInputs(
                "project_id must not be empty".into(),
            ));
        }
        Ok(())
    }
}

struct RunHandle {
    state: Arc<RwLock<RunState>>,
    cancel: watch::Sender<bool>,
    done: watch::Receiver<bool>,
}

pub struct Orchestrator {
    engine: EngineConfig,
    generator: Arc<dyn ContentGenerator>,
    store: Arc<dyn RunStore>,
    policy: Arc<dyn ScoringPolicy>,
    broadcast: Arc<BroadcastSink>,
    sinks: Vec<Arc<dyn EventSink>>,
    emitter: Arc<EventEmitter>,
    runs: RwLock<HashMap<String, RunHandle>>,
}

impl Orchestrator {
    pub fn new(
        engine: EngineConfig,
        generator: Arc<dyn ContentGenerator>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        let broadcast = Arc::new(BroadcastSink::new(engine.broadcast_capacity));
        let emitter = Arc::new(EventEmitter::new().with_sink(broadcast.clone()));
        Self {
            engine,
            generator,
            store,
            policy: Arc::new(DefaultScoringPolicy::default()),
            broadcast,
            sinks: Vec::new(),
            emitter,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Attach an extra event sink. Call before starting any run: the event
    /// log is rebuilt.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        let mut emitter = EventEmitter::new().with_sink(self.broadcast.clone());
        for sink in &self.sinks {
            emitter = emitter.with_sink(Arc::clone(sink));
        }
        self.emitter = Arc::new(emitter);
        self
    }

    pub fn with_scoring_policy(mut self, policy: Arc<dyn ScoringPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn emitter(&self) -> &Arc<EventEmitter> {
        &self.emitter
    }

    /// Live events of every run. Late subscribers catch up via [`Self::events`].
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.broadcast.subscribe()
    }

    /// Events of `run_id` from `from` on, in id order.
    pub fn events(&self, run_id: &str, from: u64) -> Vec<RunEvent> {
        self.emitter.events(run_id, from)
    }

    /// Validate inputs, register a pending run, and spawn it.
    #[instrument(skip(self, inputs), fields(project_id = %inputs.project_id))]
    pub async fn start(&self, mut inputs: RunInputs) -> Result<String> {
        inputs.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let config = inputs.config.clamped();
        let state = Arc::new(RwLock::new(RunState::new(
            &run_id,
            &inputs.project_id,
            config.clone(),
        )));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        self.runs.write().await.insert(
            run_id.clone(),
            RunHandle {
                state: Arc::clone(&state),
                cancel: cancel_tx,
                done: done_rx,
            },
        );

        let job = RunJob {
            run_id: run_id.clone(),
            config,
            brief: std::mem::take(&mut inputs.brief),
            internal_materials: std::mem::take(&mut inputs.internal_materials),
            knowledge_base: std::mem::take(&mut inputs.knowledge_base),
            uploads: std::mem::take(&mut inputs.uploads),
            engine: self.engine.clone(),
            generator: Arc::clone(&self.generator),
            store: Arc::clone(&self.store),
            policy: Arc::clone(&self.policy),
            emitter: Arc::clone(&self.emitter),
            state,
            cancel: cancel_rx,
        };
        let span = obs::run_span(&run_id);

        tokio::spawn(async move {
            let guard = job.clone();
            let started = Instant::now();
            // Inner task so a panic in the run body surfaces as a JoinError.
            let outcome = tokio::spawn(job.execute(started).instrument(span)).await;
            if let Err(e) = outcome {
                error!(run_id = %guard.run_id, error = %e, "run task aborted");
                guard
                    .finish(
                        started,
                        RunStatus::Failed,
                        Vec::new(),
                        Some(format!("run task aborted: {e}")),
                    )
                    .await;
            }
            let _ = done_tx.send(true);
        });

        info!(run_id = %run_id, "run registered");
        Ok(run_id)
    }

    /// Snapshot of a run's state.
    pub async fn status(&self, run_id: &str) -> Result<RunState> {
        let state = {
            let runs = self.runs.read().await;
            let handle = runs
                .get(run_id)
                .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?;
            Arc::clone(&handle.state)
        };
        let snapshot = state.read().await.clone();
        Ok(snapshot)
    }

    /// Request cooperative cancellation. Candidates stop at their next round
    /// boundary and queued ones never start. The run still completes with
    /// whatever reached a reviewed round; with nothing reviewed it ends
    /// `cancelled`.
    pub async fn cancel(&self, run_id: &str) -> Result<()> {
        let runs = self.runs.read().await;
        let handle = runs
            .get(run_id)
            .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?;
        if !*handle.cancel.borrow() {
            handle.cancel.send_replace(true);
            self.emitter.log(
                run_id,
                LogLevel::Warn,
                "orchestrator",
                "cancellation requested",
                json!({}),
            );
            info!(run_id = %run_id, "cancellation requested");
        }
        Ok(())
    }

    /// Wait until the run reaches a terminal status and return its snapshot.
    pub async fn wait(&self, run_id: &str) -> Result<RunState> {
        let mut done = {
            let runs = self.runs.read().await;
            runs.get(run_id)
                .map(|h| h.done.clone())
                .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?
        };
        // A dropped sender means the driver task is gone; the state is final either way.
        let _ = done.wait_for(|finished| *finished).await;
        self.status(run_id).await
    }

    /// Drop a run from the registry and the event log, cancelling it if it
    /// is still in flight. Returns the last snapshot.
    pub async fn remove(&self, run_id: &str) -> Result<RunState> {
        let handle = self
            .runs
            .write()
            .await
            .remove(run_id)
            .ok_or_else(|| SimError::RunNotFound(run_id.to_string()))?;
        handle.cancel.send_replace(true);
        self.emitter.forget(run_id);
        let snapshot = handle.state.read().await.clone();
        Ok(snapshot)
    }

    /// Ids of every registered run.
    pub async fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Owned pieces of one run, moved into its driver task.
#[derive(Clone)]
struct RunJob {
    run_id: String,
    config: SimulationConfig,
    brief: ProjectBrief,
    internal_materials: Vec<(String, String)>,
    knowledge_base: Vec<KnowledgeBatch>,
    uploads: Vec<(String, String)>,
    engine: EngineConfig,
    generator: Arc<dyn ContentGenerator>,
    store: Arc<dyn RunStore>,
    policy: Arc<dyn ScoringPolicy>,
    emitter: Arc<EventEmitter>,
    state: Arc<RwLock<RunState>>,
    cancel: watch::Receiver<bool>,
}

impl RunJob {
    async fn execute(mut self, started: Instant) {
        let project_id = self.state.read().await.project_id.clone();
        obs::emit_run_started(
            &self.run_id,
            &project_id,
            self.config.num_simulations,
            self.config.max_rounds,
        );

        let running = {
            let mut state = self.state.write().await;
            state.status = RunStatus::Running;
            state.clone()
        };
        self.emit_status(&running);
        self.save(&running).await;

        self.emitter
            .emit(&self.run_id, EventType::GraphUpdate, topology());
        self.emitter.log(
            &self.run_id,
            LogLevel::Info,
            "orchestrator",
            "effective configuration",
            json!({ "config": self.config, "worker_capacity": self.engine.worker_capacity }),
        );

        let index = match self.build_index() {
            Ok(index) => Arc::new(index),
            Err(e) => {
                self.emitter.log(
                    &self.run_id,
                    LogLevel::Error,
                    "evidence",
                    "evidence index build failed",
                    json!({ "error": e.to_string() }),
                );
                self.finish(started, RunStatus::Failed, Vec::new(), Some(e.to_string()))
                    .await;
                return;
            }
        };

        let ctx = LoopContext {
            run_id: self.run_id.clone(),
            brief: self.brief.clone(),
            output_type: self.config.output_type,
            evidence_top_k: self.engine.evidence_top_k,
            index,
            agent: Agent::new(Arc::clone(&self.generator), self.engine.retry.clone()),
            emitter: Arc::clone(&self.emitter),
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
        };
        let manager = CandidateManager::new(
            ctx,
            self.engine.worker_capacity,
            Arc::clone(&self.policy),
            Arc::clone(&self.state),
        );
        let candidates = manager
            .run(self.config.num_simulations, self.config.max_rounds)
            .await;
        let selected = select(&candidates, self.config.top_candidates);

        // Decided by candidate outcomes, so a cancel that lands after the
        // last candidate finished changes nothing.
        let (status, error) = if !selected.is_empty() {
            (RunStatus::Completed, None)
        } else if candidates
            .iter()
            .any(|c| c.terminal_state == TerminalState::Cancelled)
        {
            (RunStatus::Cancelled, None)
        } else {
            (
                RunStatus::Failed,
                Some(format!("all {} candidates failed", candidates.len())),
            )
        };
        self.finish(started, status, selected, error).await;
    }

    /// Internal materials, then knowledge-base batches, then uploads.
    /// Rejected chunks are logged and skipped; the build fails only when
    /// every supplied chunk was rejected.
    fn build_index(&mut self) -> std::result::Result<EvidenceIndex, ValidationError> {
        let mut index = EvidenceIndex::new();
        let mut batches = vec![KnowledgeBatch {
            scopes: vec![INTERNAL_SCOPE.to_string()],
            chunks: std::mem::take(&mut self.internal_materials),
        }];
        batches.append(&mut self.knowledge_base);
        batches.push(KnowledgeBatch {
            scopes: vec![PROJECT_SCOPE.to_string()],
            chunks: std::mem::take(&mut self.uploads),
        });
        let supplied: usize = batches.iter().map(|b| b.chunks.len()).sum();
        let mut rejected = 0;

        for batch in batches {
            let scopes: Vec<&str> = batch.scopes.iter().map(String::as_str).collect();
            let report = index.ingest_scoped(batch.chunks, &scopes);
            for err in &report.rejected {
                self.emitter.log(
                    &self.run_id,
                    LogLevel::Warn,
                    "evidence",
                    "chunk rejected",
                    json!({ "scopes": batch.scopes, "error": err.to_string() }),
                );
            }
            rejected += report.rejected.len();
        }

        if supplied > 0 && rejected == supplied {
            return Err(ValidationError::NoUsableEvidence { rejected });
        }
        index.close();
        self.emitter.log(
            &self.run_id,
            LogLevel::Info,
            "evidence",
            "evidence index built",
            json!({ "chunks": index.len(), "rejected": rejected }),
        );
        Ok(index)
    }

    async fn finish(
        &self,
        started: Instant,
        status: RunStatus,
        selected: Vec<String>,
        error: Option<String>,
    ) {
        let snapshot = {
            let mut state = self.state.write().await;
            state.status = status;
            state.selected_candidates = selected;
            state.error = error;
            state.finished_at = Some(Utc::now());
            state.clone()
        };
        self.emit_status(&snapshot);
        self.save(&snapshot).await;

        obs::emit_run_finished(
            &self.run_id,
            started.elapsed().as_millis() as u64,
            self.emitter.count(&self.run_id),
            &status.to_string(),
        );
        METRICS.flush();
    }

    fn emit_status(&self, state: &RunState) {
        self.emitter.emit(
            &self.run_id,
            EventType::RunStatus,
            json!({
                "status": state.status,
                "selected_candidates": state.selected_candidates,
                "error": state.error,
            }),
        );
    }

    async fn save(&self, state: &RunState) {
        if let Err(e) = self.store.save_run_state(state).await {
            obs::emit_persistence_error(&self.run_id, "run_state", &e);
        }
    }
}
