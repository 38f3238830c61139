//! Candidate scoring, completion forecasts, and top-K selection.

use crate::config::MAX_TOP_CANDIDATES;
use crate::domain::{Candidate, Forecast, Phase, Severity, TerminalState};

/// Weights and thresholds used to rank candidates.
pub trait ScoringPolicy: Send + Sync {
    /// Score in `[0, 1]`, evaluated on the candidate's final review.
    fn score(&self, candidate: &Candidate) -> f64;

    fn forecast(&self, candidate: &Candidate) -> Forecast;
}

/// `0.6 × checklist fraction + 0.3 × no blocker + 0.1 × rounds factor`.
#[derive(Debug, Clone, Copy)]
pub struct DefaultScoringPolicy {
    pub checklist_weight: f64,
    pub no_blocker_weight: f64,
    pub rounds_weight: f64,
}

impl Default for DefaultScoringPolicy {
    fn default() -> Self {
        Self {
            checklist_weight: 0.6,
            no_blocker_weight: 0.3,
            rounds_weight: 0.1,
        }
    }
}

impl DefaultScoringPolicy {
    /// 1.0 for a first-round finish, falling linearly to 0.0 at `max_rounds`.
    fn rounds_factor(rounds: u32, max_rounds: u32) -> f64 {
        if max_rounds <= 1 {
            return 1.0;
        }
        let used = rounds.clamp(1, max_rounds);
        1.0 - f64::from(used - 1) / f64::from(max_rounds - 1)
    }
}

impl ScoringPolicy for DefaultScoringPolicy {
    fn score(&self, candidate: &Candidate) -> f64 {
        if candidate.terminal_state == TerminalState::Failed {
            return 0.0;
        }
        let Some(review) = candidate.terminal_review() else {
            return 0.0;
        };
        let no_blocker = if review.has_blocker() { 0.0 } else { 1.0 };
        self.checklist_weight * review.checklist_fraction()
            + self.no_blocker_weight * no_blocker
            + self.rounds_weight
                * Self::rounds_factor(candidate.rounds_used(), candidate.max_rounds)
    }

    fn forecast(&self, candidate: &Candidate) -> Forecast {
        let review = candidate.terminal_review();
        let blockers = review.map(|r| r.count_severity(Severity::Blocker)).unwrap_or(0);
        let majors = review.map(|r| r.count_severity(Severity::Major)).unwrap_or(0);
        let rounds = candidate.rounds_used();
        let late = f64::from(rounds) > f64::from(candidate.max_rounds) / 2.0;

        let phase = if blockers > 0
            || matches!(
                candidate.terminal_state,
                TerminalState::Failed | TerminalState::RevisionExhausted | TerminalState::Cancelled
            ) {
            Phase::AtRisk
        } else if majors > 0 || late {
            Phase::Watchlist
        } else {
            Phase::OnTrack
        };

        let confidence = match candidate.terminal_state {
            TerminalState::Failed => 0.0,
            _ => review.map(|r| r.checklist_fraction()).unwrap_or(0.0),
        };

        let rationale = format!(
            "Terminal state {}. Rounds {}/{}. Blockers={}. Majors={}. Checklist completion {:.0}%.",
            candidate.terminal_state,
            rounds,
            candidate.max_rounds,
            blockers,
            majors,
            confidence * 100.0
        );
        let rationale = match review.and_then(|r| r.metric_mean()) {
            Some(mean) => format!("{rationale} Evidence alignment {mean:.2}/5."),
            None => rationale,
        };

        Forecast {
            phase,
            confidence,
            rationale,
        }
    }
}

/// Ids of the best completed candidates, best first.
///
/// Failed candidates and candidates cancelled before any reviewed round are
/// excluded. Ties keep submission order. At most `min(top_candidates, 5)` ids
/// are returned.
pub fn select(candidates: &[Candidate], top_candidates: u32) -> Vec<String> {
    let mut eligible: Vec<&Candidate> = candidates.iter().filter(|c| c.is_selectable()).collect();
    eligible.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.submission_index.cmp(&b.submission_index))
    });
    eligible
        .into_iter()
        .take(top_candidates.min(MAX_TOP_CANDIDATES) as usize)
        .map(|c| c.candidate_id.clone())
        .collect()
}
