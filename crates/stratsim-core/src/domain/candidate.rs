//! Candidates, rounds, and forecasts.

use serde::{Deserialize, Serialize};

use super::draft::Draft;
use super::review::ReviewResult;

/// One writer-then-reviewer cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub draft: Draft,
    pub review: ReviewResult,
}

impl Round {
    pub fn number(&self) -> u32 {
        self.draft.round_number
    }
}

/// How a candidate's round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Accepted,
    RevisionExhausted,
    Failed,
    /// Run was cancelled before this candidate reached another terminal state.
    /// Rounds completed before the cancellation are kept.
    Cancelled,
}

impl TerminalState {
    /// Whether the candidate produced a reviewed draft that may be selected.
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalState::Accepted | TerminalState::RevisionExhausted)
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalState::Accepted => "accepted",
            TerminalState::RevisionExhausted => "revision_exhausted",
            TerminalState::Failed => "failed",
            TerminalState::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    OnTrack,
    Watchlist,
    AtRisk,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::OnTrack => "on_track",
            Phase::Watchlist => "watchlist",
            Phase::AtRisk => "at_risk",
        };
        write!(f, "{s}")
    }
}

/// Derived, non-authoritative completion prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub phase: Phase,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub rationale: String,
}

/// One independent end-to-end drafting attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    /// Position in fan-out order; the selection tie-break.
    pub submission_index: usize,
    pub max_rounds: u32,
    pub rounds: Vec<Round>,
    pub terminal_state: TerminalState,
    pub score: f64,
    pub forecast: Option<Forecast>,
    /// Last error for `Failed` candidates.
    pub failure: Option<String>,
}

impl Candidate {
    /// Format used for candidate ids: `cand_001`, `cand_002`, ...
    pub fn id_for(submission_index: usize) -> String {
        format!("cand_{:03}", submission_index + 1)
    }

    /// A candidate with no rounds, ending in `terminal_state`.
    pub fn empty(submission_index: usize, max_rounds: u32, terminal_state: TerminalState) -> Self {
        Self {
            candidate_id: Self::id_for(submission_index),
            submission_index,
            max_rounds,
            rounds: Vec::new(),
            terminal_state,
            score: 0.0,
            forecast: None,
            failure: None,
        }
    }

    /// Whether selection may pick this candidate: it finished its loop, or it
    /// was cancelled after at least one reviewed round.
    pub fn is_selectable(&self) -> bool {
        match self.terminal_state {
            TerminalState::Accepted | TerminalState::RevisionExhausted => true,
            TerminalState::Cancelled => !self.rounds.is_empty(),
            TerminalState::Failed => false,
        }
    }

    pub fn last_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// The review the candidate terminated with, if any round completed.
    pub fn terminal_review(&self) -> Option<&ReviewResult> {
        self.rounds.last().map(|r| &r.review)
    }

    pub fn final_draft(&self) -> Option<&Draft> {
        self.rounds.last().map(|r| &r.draft)
    }

    pub fn rounds_used(&self) -> u32 {
        self.rounds.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Verdict;

    #[test]
    fn test_candidate_id_format() {
        assert_eq!(Candidate::id_for(0), "cand_001");
        assert_eq!(Candidate::id_for(41), "cand_042");
        assert_eq!(Candidate::id_for(99), "cand_100");
    }

    #[test]
    fn test_terminal_state_completion() {
        assert!(TerminalState::Accepted.is_completed());
        assert!(TerminalState::RevisionExhausted.is_completed());
        assert!(!TerminalState::Failed.is_completed());
        assert!(!TerminalState::Cancelled.is_completed());
    }

    #[test]
    fn test_cancelled_candidate_is_selectable_only_with_rounds() {
        let mut cand = Candidate::empty(0, 3, TerminalState::Cancelled);
        assert!(!cand.is_selectable());

        let draft = Draft::new("cand_001", 1, "body", vec![]);
        let review = ReviewResult {
            candidate_id: "cand_001".into(),
            round_number: 1,
            checklist: vec![],
            comments: vec![],
            metrics: vec![],
            verdict: Verdict::Revise,
        };
        cand.rounds.push(Round { draft, review });
        assert!(cand.is_selectable());

        cand.terminal_state = TerminalState::Failed;
        assert!(!cand.is_selectable());
    }

    #[test]
    fn test_terminal_state_serde_names() {
        let json = serde_json::to_string(&TerminalState::RevisionExhausted).unwrap();
        assert_eq!(json, "\"revision_exhausted\"");
        let json = serde_json::to_string(&Phase::AtRisk).unwrap();
        assert_eq!(json, "\"at_risk\"");
    }
}
