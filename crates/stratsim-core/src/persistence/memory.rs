//! In-memory stores, for tests and embedding without a filesystem.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::RunStore;
use crate::domain::{Draft, PersistenceError, ReviewResult, RunState};

type RoundKey = (String, String, u32);

/// Keeps the latest write for every key.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    states: Mutex<HashMap<String, RunState>>,
    drafts: Mutex<HashMap<RoundKey, Draft>>,
    reviews: Mutex<HashMap<RoundKey, ReviewResult>>,
    state_writes: Mutex<u64>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_state(&self, run_id: &str) -> Option<RunState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_id)
            .cloned()
    }

    pub fn draft(&self, run_id: &str, candidate_id: &str, round: u32) -> Option<Draft> {
        self.drafts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(run_id.to_string(), candidate_id.to_string(), round))
            .cloned()
    }

    pub fn review(&self, run_id: &str, candidate_id: &str, round: u32) -> Option<ReviewResult> {
        self.reviews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(run_id.to_string(), candidate_id.to_string(), round))
            .cloned()
    }

    pub fn draft_count(&self) -> usize {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn review_count(&self) -> usize {
        self.reviews.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Total `save_run_state` calls across all runs.
    pub fn state_writes(&self) -> u64 {
        *self.state_writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save_run_state(&self, state: &RunState) -> Result<(), PersistenceError> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state.run_id.clone(), state.clone());
        *self.state_writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    async fn save_draft(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        draft: &Draft,
    ) -> Result<(), PersistenceError> {
        self.drafts.lock().unwrap_or_else(PoisonError::into_inner).insert(
            (run_id.to_string(), candidate_id.to_string(), round_number),
            draft.clone(),
        );
        Ok(())
    }

    async fn save_review(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        review: &ReviewResult,
    ) -> Result<(), PersistenceError> {
        self.reviews.lock().unwrap_or_else(PoisonError::into_inner).insert(
            (run_id.to_string(), candidate_id.to_string(), round_number),
            review.clone(),
        );
        Ok(())
    }
}

/// Rejects every write.
#[derive(Debug, Default)]
pub struct FailingRunStore;

impl FailingRunStore {
    fn refuse(target: &str) -> PersistenceError {
        PersistenceError::Write {
            target: target.to_string(),
            reason: "store is read-only".to_string(),
        }
    }
}

#[async_trait]
impl RunStore for FailingRunStore {
    async fn save_run_state(&self, state: &RunState) -> Result<(), PersistenceError> {
        Err(Self::refuse(&format!("{}/run.json", state.run_id)))
    }

    async fn save_draft(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        _draft: &Draft,
    ) -> Result<(), PersistenceError> {
        Err(Self::refuse(&format!("{run_id}/{candidate_id}/draft_round_{round_number}")))
    }

    async fn save_review(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        _review: &ReviewResult,
    ) -> Result<(), PersistenceError> {
        Err(Self::refuse(&format!("{run_id}/{candidate_id}/review_round_{round_number}")))
    }
}
