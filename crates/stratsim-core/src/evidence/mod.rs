//! Evidence ingestion and retrieval.

pub mod alignment;
pub mod chunker;
pub mod index;
pub mod tokenizer;

pub use chunker::{chunk_text, normalize_text, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
pub use alignment::review_metrics;
pub use index::{
    EvidenceChunk, EvidenceHit, EvidenceIndex, IngestReport, COMPLIANCE_SCOPE, DEFAULT_SCOPE,
    GOVERNMENT_SCOPE, HISTORICAL_SCOPE, INTERNAL_SCOPE, PROJECT_SCOPE, TECHNICAL_SCOPE,
};
pub use tokenizer::tokenize;
