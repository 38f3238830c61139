//! Filesystem-backed run records.
//!
//! Layout under `root`:
//!
//! ```text
//! runs/<run_id>/run.json
//! runs/<run_id>/events.jsonl
//! runs/<run_id>/candidates/<candidate_id>/draft_round_<n>.md
//! runs/<run_id>/candidates/<candidate_id>/draft_round_<n>.json
//! runs/<run_id>/candidates/<candidate_id>/review_round_<n>.json
//! ```
//!
//! Snapshot files are written atomically (temp file in the same directory,
//! then rename); the event log is append-only.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tempfile::NamedTempFile;

use super::RunStore;
use crate::domain::{Draft, PersistenceError, ReviewResult, RunEvent, RunState};
use crate::events::EventSink;
use crate::obs;

fn run_dir(root: &Path, run_id: &str) -> PathBuf {
    root.join("runs").join(run_id)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir).context("creating temp file")?;
    tmp.write_all(bytes).context("writing temp file")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct DraftRecord<'a> {
    candidate_id: &'a str,
    round_number: u32,
    digest: &'a str,
    word_count: usize,
    cited_evidence_ids: &'a [String],
}

#[derive(Debug, Clone)]
pub struct FsRunStore {
    root: PathBuf,
}

impl FsRunStore {
    /// Create a store rooted at `root`, creating `root/runs/` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("runs"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        run_dir(&self.root, run_id)
    }

    fn candidate_dir(&self, run_id: &str, candidate_id: &str) -> PathBuf {
        self.run_dir(run_id).join("candidates").join(candidate_id)
    }

    pub fn load_run_state(&self, run_id: &str) -> Result<RunState, PersistenceError> {
        let bytes = fs::read(self.run_dir(run_id).join("run.json"))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_files(&self, files: Vec<(PathBuf, Vec<u8>)>) -> Result<(), PersistenceError> {
        let target = files
            .first()
            .map(|(p, _)| p.display().to_string())
            .unwrap_or_default();
        let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            for (path, bytes) in &files {
                write_atomic(path, bytes)?;
            }
            Ok(())
        })
        .await;

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PersistenceError::Write {
                target,
                reason: format!("{e:#}"),
            }),
            Err(join) => Err(PersistenceError::Write {
                target,
                reason: join.to_string(),
            }),
        }
    }
}

#[async_trait]
impl RunStore for FsRunStore {
    async fn save_run_state(&self, state: &RunState) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        let path = self.run_dir(&state.run_id).join("run.json");
        self.write_files(vec![(path, bytes)]).await
    }

    async fn save_draft(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        draft: &Draft,
    ) -> Result<(), PersistenceError> {
        let dir = self.candidate_dir(run_id, candidate_id);
        let record = serde_json::to_vec_pretty(&DraftRecord {
            candidate_id,
            round_number,
            digest: &draft.digest,
            word_count: draft.word_count(),
            cited_evidence_ids: &draft.cited_evidence_ids,
        })?;
        self.write_files(vec![
            (
                dir.join(format!("draft_round_{round_number}.md")),
                draft.body_text.clone().into_bytes(),
            ),
            (dir.join(format!("draft_round_{round_number}.json")), record),
        ])
        .await
    }

    async fn save_review(
        &self,
        run_id: &str,
        candidate_id: &str,
        round_number: u32,
        review: &ReviewResult,
    ) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(review)?;
        let path = self
            .candidate_dir(run_id, candidate_id)
            .join(format!("review_round_{round_number}.json"));
        self.write_files(vec![(path, bytes)]).await
    }
}

/// Appends every event to `runs/<run_id>/events.jsonl`.
///
/// Delivery happens outside the emitter's lock, so lines from concurrent
/// candidates may land slightly out of id order; [`JsonlEventSink::read`]
/// sorts them back.
#[derive(Debug)]
pub struct JsonlEventSink {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, run_id: &str) -> PathBuf {
        run_dir(&self.root, run_id).join("events.jsonl")
    }

    fn append(&self, event: &RunEvent) -> anyhow::Result<()> {
        let path = self.path(&event.run_id);
        let mut line = serde_json::to_vec(event).context("serializing event")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(&line).context("appending event")?;
        Ok(())
    }

    /// Read a run's event log in event-id order.
    pub fn read(&self, run_id: &str) -> Result<Vec<RunEvent>, PersistenceError> {
        let text = fs::read_to_string(self.path(run_id))?;
        let mut events = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str::<RunEvent>)
            .collect::<Result<Vec<_>, _>>()?;
        events.sort_by_key(|e| e.event_id);
        Ok(events)
    }
}

impl EventSink for JsonlEventSink {
    fn publish(&self, event: &RunEvent) {
        if let Err(e) = self.append(event) {
            obs::emit_persistence_error(&event.run_id, "events.jsonl", &format!("{e:#}"));
        }
    }
}
