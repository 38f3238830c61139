//! Run state and the run event record.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::candidate::Candidate;
use crate::config::SimulationConfig;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time view of a run.
///
/// Mutated only by the orchestrator and the candidate manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub project_id: String,
    pub status: RunStatus,
    /// Effective configuration after clamping.
    pub config: SimulationConfig,
    /// Keyed by candidate id; ids sort in submission order.
    pub candidates: BTreeMap<String, Candidate>,
    /// Ordered by descending score.
    pub selected_candidates: Vec<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, project_id: impl Into<String>, config: SimulationConfig) -> Self {
        Self {
            run_id: run_id.into(),
            project_id: project_id.into(),
            status: RunStatus::Pending,
            config,
            candidates: BTreeMap::new(),
            selected_candidates: Vec::new(),
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Candidate with the best selection rank, if any was selected.
    pub fn top_candidate(&self) -> Option<&Candidate> {
        self.selected_candidates
            .first()
            .and_then(|id| self.candidates.get(id))
    }
}

/// Classification of a run event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Log,
    GraphUpdate,
    RoundUpdate,
    DraftCreated,
    ReviewResult,
    RunStatus,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Log => "log",
            EventType::GraphUpdate => "graph_update",
            EventType::RoundUpdate => "round_update",
            EventType::DraftCreated => "draft_created",
            EventType::ReviewResult => "review_result",
            EventType::RunStatus => "run_status",
        };
        write!(f, "{s}")
    }
}

/// A single entry in a run's event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    /// Gapless, starting at 0 within the run.
    pub event_id: u64,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
}
