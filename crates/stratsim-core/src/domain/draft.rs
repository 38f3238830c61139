//! Writer output.

use serde::{Deserialize, Serialize};

/// A single writer-produced draft for one round of one candidate.
///
/// Drafts are immutable once produced; the next round supersedes a draft with
/// a new value rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub candidate_id: String,
    pub round_number: u32,
    pub body_text: String,
    /// Evidence chunk ids the writer cites. Must resolve in the run's index.
    pub cited_evidence_ids: Vec<String>,
    /// SHA-256 hex digest of `body_text`.
    pub digest: String,
}

impl Draft {
    /// Construct a draft, computing and embedding the body digest.
    pub fn new(
        candidate_id: impl Into<String>,
        round_number: u32,
        body_text: impl Into<String>,
        cited_evidence_ids: Vec<String>,
    ) -> Self {
        let body_text = body_text.into();
        let digest = body_digest(&body_text);
        Self {
            candidate_id: candidate_id.into(),
            round_number,
            body_text,
            cited_evidence_ids,
            digest,
        }
    }

    /// Approximate word count of the body.
    pub fn word_count(&self) -> usize {
        self.body_text.split_whitespace().count()
    }

    /// Short digest form (first 12 hex chars) for logs and file names.
    pub fn short_digest(&self) -> &str {
        &self.digest[..12.min(self.digest.len())]
    }
}

fn body_digest(body: &str) -> String {
    use sha2::Digest as _;
    hex::encode(sha2::Sha256::digest(body.as_bytes()))
}
