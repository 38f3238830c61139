//! Per-run TF-IDF evidence index.
//!
//! Lifecycle: `ingest` (single writer, any number of calls) → `close`
//! (weights computed once) → `query` (many readers, no locking). The index is
//! wrapped in an `Arc` after closing and never mutated again.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::tokenizer::tokenize;
use crate::domain::{IndexError, ValidationError};

/// Scope given to chunks ingested without explicit scopes.
pub const DEFAULT_SCOPE: &str = "public";
/// Organisation-internal materials.
pub const INTERNAL_SCOPE: &str = "ifad";
/// Project uploads.
pub const PROJECT_SCOPE: &str = "project";
pub const GOVERNMENT_SCOPE: &str = "government";
pub const TECHNICAL_SCOPE: &str = "technical";
pub const COMPLIANCE_SCOPE: &str = "compliance";
/// Earlier strategy documents; the baseline for novelty.
pub const HISTORICAL_SCOPE: &str = "historical_cosop";

/// A unit of retrievable source text. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: String,
    pub source_name: String,
    pub text: String,
    /// Global ingestion position; the relevance tie-break.
    pub sequence_index: usize,
    /// Knowledge scopes used for scoped retrieval.
    pub scopes: Vec<String>,
}

/// One ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceHit {
    pub chunk_id: String,
    pub score: f64,
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Ids of chunks appended, in call order.
    pub accepted: Vec<String>,
    /// Chunks refused, one error each; the rest of the batch is unaffected.
    pub rejected: Vec<ValidationError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Accepted ids, or the first rejection.
    pub fn into_result(self) -> Result<Vec<String>, ValidationError> {
        match self.rejected.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.accepted),
        }
    }
}

type TermVector = HashMap<String, f64>;

#[derive(Debug, Default)]
pub struct EvidenceIndex {
    chunks: Vec<EvidenceChunk>,
    positions: HashMap<String, usize>,
    closed: bool,
    idf: HashMap<String, f64>,
    vectors: Vec<TermVector>,
}

impl EvidenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn chunks(&self) -> &[EvidenceChunk] {
        &self.chunks
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&EvidenceChunk> {
        self.positions.get(chunk_id).map(|&i| &self.chunks[i])
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.positions.contains_key(chunk_id)
    }

    /// Append `(source_name, text)` chunks with the default scope.
    pub fn ingest<I, S, T>(&mut self, chunks: I) -> IngestReport
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        self.ingest_scoped(chunks, &[DEFAULT_SCOPE])
    }

    /// Append `(source_name, text)` chunks tagged with `scopes`.
    ///
    /// Empty or whitespace-only text is rejected per chunk; the remaining
    /// chunks of the batch are still appended in call order.
    pub fn ingest_scoped<I, S, T>(&mut self, chunks: I, scopes: &[&str]) -> IngestReport
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut report = IngestReport::default();
        let scopes: Vec<String> = if scopes.is_empty() {
            vec![DEFAULT_SCOPE.to_string()]
        } else {
            scopes.iter().map(|s| s.to_string()).collect()
        };

        for (position, (source_name, text)) in chunks.into_iter().enumerate() {
            let source_name = source_name.into();
            let text = text.into();

            if self.closed {
                report.rejected.push(ValidationError::IndexClosed);
                continue;
            }
            if source_name.trim().is_empty() {
                report
                    .rejected
                    .push(ValidationError::EmptySourceName { position });
                continue;
            }
            if text.trim().is_empty() {
                report.rejected.push(ValidationError::EmptyChunk {
                    source_name,
                    position,
                });
                continue;
            }

            let sequence_index = self.chunks.len();
            let id = format!("ev_{sequence_index:05}");
            self.positions.insert(id.clone(), sequence_index);
            self.chunks.push(EvidenceChunk {
                id: id.clone(),
                source_name,
                text,
                sequence_index,
                scopes: scopes.clone(),
            });
            report.accepted.push(id);
        }

        report
    }

    /// Close ingestion and compute term weights. Idempotent.
    ///
    /// Uses smoothed inverse document frequency `ln((1 + n) / (1 + df)) + 1`
    /// and L2-normalised term vectors.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }

        let tokenized: Vec<Vec<String>> = self.chunks.iter().map(|c| tokenize(&c.text)).collect();

        let mut doc_freq: HashMap<&str, usize> = HashMap::new();
        for terms in &tokenized {
            let unique: HashSet<&str> = terms.iter().map(String::as_str).collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let n = self.chunks.len() as f64;
        self.idf = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let idf = ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0;
                (term.to_string(), idf)
            })
            .collect();

        self.vectors = tokenized.iter().map(|terms| self.weigh(terms)).collect();
        self.closed = true;

        debug!(
            chunks = self.chunks.len(),
            vocabulary = self.idf.len(),
            "evidence index closed"
        );
    }

    /// Top-`k` chunks for `text`, most relevant first, ties by ascending
    /// `sequence_index`. An unclosed or empty index yields no evidence.
    pub fn query(&self, text: &str, k: usize) -> Vec<EvidenceHit> {
        self.try_query(text, k).unwrap_or_else(|e| {
            debug!(error = %e, "evidence query treated as empty");
            Vec::new()
        })
    }

    /// Like [`query`](Self::query), restricted to chunks sharing a scope with `scopes`.
    pub fn query_scoped(&self, text: &str, k: usize, scopes: &[&str]) -> Vec<EvidenceHit> {
        self.rank(text, k, Some(scopes)).unwrap_or_else(|e| {
            debug!(error = %e, "scoped evidence query treated as empty");
            Vec::new()
        })
    }

    /// Query surfacing why no evidence is available.
    pub fn try_query(&self, text: &str, k: usize) -> Result<Vec<EvidenceHit>, IndexError> {
        self.rank(text, k, None)
    }

    fn rank(
        &self,
        text: &str,
        k: usize,
        scopes: Option<&[&str]>,
    ) -> Result<Vec<EvidenceHit>, IndexError> {
        if !self.closed {
            return Err(IndexError::NotClosed);
        }
        if self.chunks.is_empty() {
            return Err(IndexError::Empty);
        }

        let query_vec = self.weigh(&tokenize(text));

        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| match scopes {
                Some(wanted) => chunk.scopes.iter().any(|s| wanted.contains(&s.as_str())),
                None => true,
            })
            .map(|(i, _)| (i, cosine(&query_vec, &self.vectors[i])))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.chunks[a.0].sequence_index.cmp(&self.chunks[b.0].sequence_index))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| EvidenceHit {
                chunk_id: self.chunks[i].id.clone(),
                score,
            })
            .collect())
    }

    /// TF-IDF vector for `terms`, L2-normalised. Terms outside the
    /// vocabulary are dropped.
    fn weigh(&self, terms: &[String]) -> TermVector {
        let mut vector: TermVector = HashMap::new();
        for term in terms {
            if let Some(idf) = self.idf.get(term) {
                *vector.entry(term.clone()).or_insert(0.0) += idf;
            }
        }
        let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for w in vector.values_mut() {
                *w /= norm;
            }
        }
        vector
    }
}

fn cosine(query: &TermVector, doc: &TermVector) -> f64 {
    query
        .iter()
        .filter_map(|(term, w)| doc.get(term).map(|d| w * d))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> EvidenceIndex {
        let mut idx = EvidenceIndex::new();
        let report = idx.ingest(vec![
            ("strategy.md", "Rural poverty remains high in the northern provinces."),
            ("strategy.md", "Climate adaptation and safeguards for smallholder farmers."),
            ("budget.md", "Fiscal space is constrained by debt service obligations."),
        ]);
        assert!(report.is_clean());
        idx.close();
        idx
    }

    #[test]
    fn test_ingest_assigns_sequential_ids() {
        let mut idx = EvidenceIndex::new();
        let ids = idx
            .ingest(vec![("a.md", "first chunk"), ("b.md", "second chunk")])
            .into_result()
            .unwrap();
        assert_eq!(ids, vec!["ev_00000", "ev_00001"]);
        let more = idx.ingest(vec![("c.md", "third chunk")]).into_result().unwrap();
        assert_eq!(more, vec!["ev_00002"]);
        assert_eq!(idx.chunk("ev_00002").unwrap().sequence_index, 2);
    }

    #[test]
    fn test_empty_chunk_rejected_without_changing_count() {
        let mut idx = EvidenceIndex::new();
        idx.ingest(vec![("a.md", "kept")]);
        let report = idx.ingest(vec![("empty.md", "   \n\t")]);
        assert_eq!(idx.len(), 1);
        assert!(matches!(
            report.into_result(),
            Err(ValidationError::EmptyChunk { .. })
        ));
    }

    #[test]
    fn test_rejection_does_not_lose_rest_of_batch() {
        let mut idx = EvidenceIndex::new();
        let report = idx.ingest(vec![("a.md", "alpha"), ("b.md", ""), ("c.md", "gamma")]);
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(
            report.rejected[0],
            ValidationError::EmptyChunk {
                source_name: "b.md".into(),
                position: 1
            }
        );
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_empty_source_name_rejected() {
        let mut idx = EvidenceIndex::new();
        let report = idx.ingest(vec![(" ", "text")]);
        assert_eq!(report.rejected, vec![ValidationError::EmptySourceName { position: 0 }]);
    }

    #[test]
    fn test_ingest_after_close_rejected() {
        let mut idx = corpus();
        let report = idx.ingest(vec![("late.md", "too late")]);
        assert_eq!(report.rejected, vec![ValidationError::IndexClosed]);
        assert_eq!(idx.len(), 3);
    }

    #[test]
    fn test_query_ranks_most_relevant_first() {
        let idx = corpus();
        let hits = idx.query("climate safeguards", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].chunk_id, "ev_00001");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_query_ties_break_by_sequence() {
        let idx = corpus();
        // No term overlaps: every score is zero and order falls back to ingestion order.
        let hits = idx.query("unrelated vocabulary", 3);
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["ev_00000", "ev_00001", "ev_00002"]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn test_query_truncates_to_corpus_size() {
        let idx = corpus();
        assert_eq!(idx.query("poverty", 50).len(), 3);
        assert_eq!(idx.query("poverty", 1).len(), 1);
    }

    #[test]
    fn test_query_is_idempotent() {
        let idx = corpus();
        let a = idx.query("rural poverty fiscal", 3);
        let b = idx.query("rural poverty fiscal", 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_index_query_returns_empty() {
        let mut idx = EvidenceIndex::new();
        idx.close();
        assert!(idx.query("anything", 5).is_empty());
        assert_eq!(idx.try_query("anything", 5), Err(IndexError::Empty));
    }

    #[test]
    fn test_unclosed_index_yields_no_evidence() {
        let mut idx = EvidenceIndex::new();
        idx.ingest(vec![("a.md", "rural poverty")]);
        assert!(idx.query("poverty", 1).is_empty());
        assert_eq!(idx.try_query("poverty", 1), Err(IndexError::NotClosed));
    }

    #[test]
    fn test_scoped_query_filters_chunks() {
        let mut idx = EvidenceIndex::new();
        idx.ingest_scoped(vec![("gov.md", "national priorities for agriculture")], &["government"]);
        idx.ingest_scoped(vec![("tech.md", "agriculture irrigation feasibility")], &["technical"]);
        idx.close();

        let hits = idx.query_scoped("agriculture", 5, &["technical"]);
        assert_eq!(hits.len(), 1);
        assert_eq!(idx.chunk(&hits[0].chunk_id).unwrap().source_name, "tech.md");

        assert_eq!(idx.query("agriculture", 5).len(), 2);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let mut idx = EvidenceIndex::new();
        idx.ingest(vec![
            ("a.md", "farmers farmers irrigation"),
            ("b.md", "farmers markets"),
            ("c.md", "farmers cooperatives"),
        ]);
        idx.close();
        let hits = idx.query("farmers irrigation", 3);
        assert_eq!(hits[0].chunk_id, "ev_00000");
    }
}
