//! Stratsim Core Library
//!
//! Simulation engine that drafts strategy documents by running independent
//! writer/reviewer candidates over a per-run evidence index, then scoring
//! and selecting the best of them.

pub mod agent;
pub mod candidates;
pub mod config;
pub mod domain;
pub mod events;
pub mod evidence;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod persistence;
pub mod retry;
pub mod round_loop;
pub mod scoring;
pub mod telemetry;

pub use agent::{
    Agent, AgentContext, ContentGenerator, EvidenceExcerpt, Generation, HeuristicGenerator,
    ProjectBrief, Role, StakeholderId, StakeholderNotes,
};
pub use candidates::CandidateManager;
pub use config::{EngineConfig, OutputType, SimulationConfig};
pub use domain::{
    Candidate, CheckStatus, CheckboxStatus, Draft, EventType, Forecast, GenerationError,
    IndexError, PersistenceError, Phase, Result, ReviewComment, ReviewMetric, ReviewResult, Round,
    RunEvent,
    RunState, RunStatus, Severity, SimError, TerminalState, ValidationError, Verdict,
};
pub use events::{BroadcastSink, EventEmitter, EventSink, LogLevel};
pub use evidence::{
    chunk_text, normalize_text, EvidenceChunk, EvidenceHit, EvidenceIndex, IngestReport,
};
pub use orchestrator::{KnowledgeBatch, Orchestrator, RunInputs};
pub use persistence::{FsRunStore, JsonlEventSink, MemoryRunStore, RunStore};
pub use retry::RetryPolicy;
pub use round_loop::{run_candidate, LoopContext, LoopState};
pub use scoring::{select, DefaultScoringPolicy, ScoringPolicy};
pub use telemetry::init_tracing;

/// Crate version, for CLI banners and persisted run metadata.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
