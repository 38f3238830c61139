//! Reviewer output: checklist, comments, evidence metrics, verdict.

use serde::{Deserialize, Serialize};

/// Outcome of a single checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    True,
    False,
    Partial,
}

/// One named acceptance criterion as scored by the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckboxStatus {
    pub id: String,
    pub label: String,
    pub status: CheckStatus,
    pub rationale: String,
}

impl CheckboxStatus {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        status: CheckStatus,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            status,
            rationale: rationale.into(),
        }
    }
}

/// Comment severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Major,
    Blocker,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Blocker => "blocker",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub severity: Severity,
    pub section: String,
    pub comment: String,
    pub suggestion: Option<String>,
}

impl ReviewComment {
    pub fn new(severity: Severity, section: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            severity,
            section: section.into(),
            comment: comment.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accept,
    Revise,
}

/// Upper bound of a [`ReviewMetric`] score.
pub const METRIC_SCALE: f64 = 5.0;

/// Evidence-grounded rating of a draft, scored `0..=5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewMetric {
    pub id: String,
    pub label: String,
    pub score: f64,
    pub rationale: String,
    /// Chunks the score was measured against, best first.
    #[serde(default)]
    pub evidence_ids: Vec<String>,
}

/// Reviewer verdict on the draft of the same round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub candidate_id: String,
    pub round_number: u32,
    pub checklist: Vec<CheckboxStatus>,
    pub comments: Vec<ReviewComment>,
    /// Attached by the round loop after the reviewer returns.
    #[serde(default)]
    pub metrics: Vec<ReviewMetric>,
    pub verdict: Verdict,
}

impl ReviewResult {
    /// Fraction of checklist items with status `true`. Empty checklist yields 0.
    pub fn checklist_fraction(&self) -> f64 {
        if self.checklist.is_empty() {
            return 0.0;
        }
        let done = self
            .checklist
            .iter()
            .filter(|c| c.status == CheckStatus::True)
            .count();
        done as f64 / self.checklist.len() as f64
    }

    /// Whether every checklist item is `true` (and there is at least one).
    pub fn checklist_complete(&self) -> bool {
        !self.checklist.is_empty()
            && self
                .checklist
                .iter()
                .all(|c| c.status == CheckStatus::True)
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.comments
            .iter()
            .filter(|c| c.severity == severity)
            .count()
    }

    pub fn has_blocker(&self) -> bool {
        self.count_severity(Severity::Blocker) > 0
    }

    pub fn has_major(&self) -> bool {
        self.count_severity(Severity::Major) > 0
    }

    /// The round loop's acceptance rule: explicit accept, or a complete
    /// checklist with no blocker left.
    pub fn is_acceptable(&self) -> bool {
        self.verdict == Verdict::Accept || (self.checklist_complete() && !self.has_blocker())
    }

    /// Mean metric score, or `None` before metrics are attached.
    pub fn metric_mean(&self) -> Option<f64> {
        if self.metrics.is_empty() {
            return None;
        }
        Some(self.metrics.iter().map(|m| m.score).sum::<f64>() / self.metrics.len() as f64)
    }

    /// Revision notes for the next writer turn, one bullet per comment.
    pub fn revision_notes(&self) -> String {
        self.comments
            .iter()
            .map(|c| {
                let mut line = format!("- [{}] {}: {}", c.severity, c.section, c.comment);
                if let Some(s) = &c.suggestion {
                    line.push_str(" Suggestion: ");
                    line.push_str(s);
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(statuses: &[CheckStatus], comments: Vec<ReviewComment>, verdict: Verdict) -> ReviewResult {
        ReviewResult {
            candidate_id: "cand_001".into(),
            round_number: 1,
            checklist: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| CheckboxStatus::new(format!("c{i}"), "label", *s, "why"))
                .collect(),
            comments,
            metrics: Vec::new(),
            verdict,
        }
    }

    #[test]
    fn test_checklist_fraction_counts_only_true() {
        let r = review(
            &[CheckStatus::True, CheckStatus::Partial, CheckStatus::False, CheckStatus::True],
            vec![],
            Verdict::Revise,
        );
        assert!((r.checklist_fraction() - 0.5).abs() < f64::EPSILON);
        assert!(!r.checklist_complete());
    }

    #[test]
    fn test_empty_checklist_is_not_complete() {
        let r = review(&[], vec![], Verdict::Revise);
        assert_eq!(r.checklist_fraction(), 0.0);
        assert!(!r.checklist_complete());
        assert!(!r.is_acceptable());
    }

    #[test]
    fn test_complete_checklist_without_blocker_is_acceptable_despite_revise() {
        let r = review(
            &[CheckStatus::True, CheckStatus::True],
            vec![ReviewComment::new(Severity::Minor, "Style", "tighten prose")],
            Verdict::Revise,
        );
        assert!(r.is_acceptable());
    }

    #[test]
    fn test_blocker_prevents_implicit_acceptance() {
        let r = review(
            &[CheckStatus::True],
            vec![ReviewComment::new(Severity::Blocker, "Structure", "missing risks")],
            Verdict::Revise,
        );
        assert!(r.has_blocker());
        assert!(!r.is_acceptable());
    }

    #[test]
    fn test_revision_notes_include_suggestion() {
        let r = review(
            &[],
            vec![ReviewComment::new(Severity::Major, "Evidence", "no citations")
                .with_suggestion("cite the annex")],
            Verdict::Revise,
        );
        assert_eq!(
            r.revision_notes(),
            "- [major] Evidence: no citations Suggestion: cite the annex"
        );
    }

    #[test]
    fn test_metric_mean() {
        let mut r = review(&[], vec![], Verdict::Revise);
        assert_eq!(r.metric_mean(), None);
        for (id, score) in [("a", 4.0), ("b", 1.0)] {
            r.metrics.push(ReviewMetric {
                id: id.into(),
                label: id.into(),
                score,
                rationale: String::new(),
                evidence_ids: vec![],
            });
        }
        assert_eq!(r.metric_mean(), Some(2.5));
    }

    #[test]
    fn test_review_without_metrics_deserializes() {
        let json = r#"{"candidate_id":"cand_001","round_number":1,"checklist":[],"comments":[],"verdict":"accept"}"#;
        let r: ReviewResult = serde_json::from_str(json).unwrap();
        assert!(r.metrics.is_empty());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Blocker > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
    }
}
