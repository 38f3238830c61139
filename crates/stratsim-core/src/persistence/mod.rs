//! Narrow persistence interface the engine writes through.
//!
//! Writes are best-effort: callers log a failed write and keep going, so a
//! store is never a correctness dependency of in-memory run progress.

pub mod fs;
pub mod memory;

use async_trait::async_trait;

use crate::domain::{Draft, PersistenceError, ReviewResult, RunState};

pub use fs::{FsRunStore, JsonlEventSink};
pub use memory::{FailingRunStore, MemoryRunStore};

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn save_run_state(&self, state: &RunState) -> Result<(), PersistenceError>;

    async fn save_draft(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        draft: &Draft,
    ) -> Result<(), PersistenceError>;

    async fn save_review(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        review: &ReviewResult,
    ) -> Result<(), PersistenceError>;
}
