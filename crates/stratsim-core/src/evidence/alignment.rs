//! Evidence-alignment metrics attached to every review.
//!
//! Each similarity metric queries the run's index with the head of the draft,
//! restricted to one knowledge scope, and maps the best cosine similarity onto
//! `0..=5`. Innovation inverts the scale against public and historical
//! strategy material.

use super::index::{
    EvidenceIndex, DEFAULT_SCOPE, GOVERNMENT_SCOPE, HISTORICAL_SCOPE, INTERNAL_SCOPE,
    TECHNICAL_SCOPE,
};
use crate::domain::{Draft, ReviewMetric, ReviewResult, Severity, METRIC_SCALE};

/// Leading characters of the draft used as the similarity query.
const QUERY_CHARS: usize = 2000;
const QUERY_TOP_K: usize = 3;
/// Evidence ids kept per metric.
const EVIDENCE_KEPT: usize = 2;

/// Five metrics in fixed order: strategic consistency, country priority
/// match, technical feasibility, compliance risk, innovation.
pub fn review_metrics(index: &EvidenceIndex, draft: &Draft, review: &ReviewResult) -> Vec<ReviewMetric> {
    let query: String = draft.body_text.chars().take(QUERY_CHARS).collect();
    vec![
        similarity(
            index,
            &query,
            ("strategic_consistency", "Strategic consistency"),
            &[INTERNAL_SCOPE],
            false,
        ),
        similarity(
            index,
            &query,
            ("country_priority_match", "Country priority match"),
            &[GOVERNMENT_SCOPE],
            false,
        ),
        similarity(
            index,
            &query,
            ("technical_feasibility", "Technical feasibility"),
            &[TECHNICAL_SCOPE],
            false,
        ),
        compliance(review),
        similarity(
            index,
            &query,
            ("innovation", "Innovation (distance from prior strategies)"),
            &[DEFAULT_SCOPE, HISTORICAL_SCOPE],
            true,
        ),
    ]
}

fn similarity(
    index: &EvidenceIndex,
    query: &str,
    (id, label): (&str, &str),
    scopes: &[&str],
    invert: bool,
) -> ReviewMetric {
    let hits = index.query_scoped(query, QUERY_TOP_K, scopes);
    let scope_list = scopes.join(", ");

    let (score, rationale) = match hits.iter().map(|h| h.score).reduce(f64::max) {
        None => (
            if invert { METRIC_SCALE } else { 0.0 },
            format!("No evidence retrieved for scopes: {scope_list}."),
        ),
        Some(best) => {
            let aligned = if invert { 1.0 - best } else { best };
            (
                (aligned * METRIC_SCALE).clamp(0.0, METRIC_SCALE),
                format!("Top cosine similarity={best:.2} for scopes: {scope_list}."),
            )
        }
    };

    ReviewMetric {
        id: id.to_string(),
        label: label.to_string(),
        score,
        rationale,
        evidence_ids: hits
            .into_iter()
            .take(EVIDENCE_KEPT)
            .map(|h| h.chunk_id)
            .collect(),
    }
}

fn compliance(review: &ReviewResult) -> ReviewMetric {
    let blockers = review.count_severity(Severity::Blocker);
    let (score, rationale) = if review.is_acceptable() {
        (4.5, "Review passed; no blocker issues.".to_string())
    } else if blockers > 0 {
        (1.5, format!("Review flagged blockers ({blockers})."))
    } else {
        (2.5, "Review identified gaps but no blockers.".to_string())
    };
    ReviewMetric {
        id: "compliance_risk".into(),
        label: "Compliance, risk, and results chain".into(),
        score,
        rationale,
        evidence_ids: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReviewComment, Verdict};

    fn index() -> EvidenceIndex {
        let mut index = EvidenceIndex::new();
        index.ingest_scoped(
            vec![("strategy.md", "irrigation investment for smallholder farmers")],
            &[INTERNAL_SCOPE],
        );
        index.ingest_scoped(
            vec![("old_cosop.md", "irrigation investment for smallholder farmers")],
            &[HISTORICAL_SCOPE],
        );
        index.close();
        index
    }

    fn review(verdict: Verdict, comments: Vec<ReviewComment>) -> ReviewResult {
        ReviewResult {
            candidate_id: "cand_001".into(),
            round_number: 1,
            checklist: vec![],
            comments,
            metrics: vec![],
            verdict,
        }
    }

    fn metric<'a>(metrics: &'a [ReviewMetric], id: &str) -> &'a ReviewMetric {
        metrics.iter().find(|m| m.id == id).unwrap()
    }

    #[test]
    fn test_metrics_in_fixed_order() {
        let draft = Draft::new("cand_001", 1, "irrigation investment", vec![]);
        let ids: Vec<String> = review_metrics(&index(), &draft, &review(Verdict::Accept, vec![]))
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "strategic_consistency",
                "country_priority_match",
                "technical_feasibility",
                "compliance_risk",
                "innovation",
            ]
        );
    }

    #[test]
    fn test_similar_draft_scores_high_alignment_and_low_innovation() {
        let draft = Draft::new(
            "cand_001",
            1,
            "irrigation investment for smallholder farmers",
            vec![],
        );
        let metrics = review_metrics(&index(), &draft, &review(Verdict::Accept, vec![]));

        let strategic = metric(&metrics, "strategic_consistency");
        assert!(strategic.score > 4.9, "{}", strategic.score);
        assert_eq!(strategic.evidence_ids, vec!["ev_00000"]);
        assert!(metric(&metrics, "innovation").score < 0.1);
    }

    #[test]
    fn test_empty_scope_scores_zero_but_innovation_full() {
        let draft = Draft::new("cand_001", 1, "market access", vec![]);
        let metrics = review_metrics(&EvidenceIndex::new(), &draft, &review(Verdict::Revise, vec![]));

        let country = metric(&metrics, "country_priority_match");
        assert_eq!(country.score, 0.0);
        assert!(country.rationale.starts_with("No evidence retrieved"));
        assert_eq!(metric(&metrics, "innovation").score, METRIC_SCALE);
    }

    #[test]
    fn test_compliance_follows_review_outcome() {
        let draft = Draft::new("cand_001", 1, "body", vec![]);
        let idx = index();
        let score = |r: ReviewResult| metric(&review_metrics(&idx, &draft, &r), "compliance_risk").score;

        assert_eq!(score(review(Verdict::Accept, vec![])), 4.5);
        assert_eq!(
            score(review(
                Verdict::Revise,
                vec![ReviewComment::new(Severity::Blocker, "Risks", "missing")]
            )),
            1.5
        );
        assert_eq!(score(review(Verdict::Revise, vec![])), 2.5);
    }
}
