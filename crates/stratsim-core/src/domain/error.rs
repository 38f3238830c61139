//! Error taxonomy for the simulation engine.

/// Input rejected at a boundary (bad chunk, malformed run inputs).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("chunk {position} from {source_name} has empty text")]
    EmptyChunk {
        source_name: String,
        position: usize,
    },

    #[error("chunk {position} has an empty source name")]
    EmptySourceName { position: usize },

    #[error("evidence index is closed; no further ingestion is accepted")]
    IndexClosed,

    #[error("evidence index build failed: all {rejected} supplied chunks were rejected")]
    NoUsableEvidence { rejected: usize },

    #[error("invalid run inputs: {0}")]
    InvalidInputs(String),
}

/// Agent backend failure. Never accompanied by a partial result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("malformed generation output: {0}")]
    Malformed(String),

    #[error("generation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("generation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Query against an index that cannot answer. Callers treat it as "no evidence".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    #[error("evidence index has not been closed")]
    NotClosed,

    #[error("evidence index is empty")]
    Empty,
}

/// Best-effort persistence write failure.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("persistence write failed for {target}: {reason}")]
    Write { target: String, reason: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_names_source() {
        let err = ValidationError::EmptyChunk {
            source_name: "brief.md".to_string(),
            position: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("brief.md"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn test_sim_error_wraps_generation_error() {
        let err: SimError = GenerationError::Unavailable("backend down".to_string()).into();
        assert!(err.to_string().contains("generation error"));
        assert!(err.to_string().contains("backend down"));
    }

    #[test]
    fn test_run_not_found() {
        let err = SimError::RunNotFound("run-1".to_string());
        assert_eq!(err.to_string(), "run not found: run-1");
    }
}
