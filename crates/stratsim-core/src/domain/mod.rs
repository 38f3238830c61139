//! Domain models for the simulation engine.
//!
//! - `Draft`: writer output for one round
//! - `ReviewResult`: reviewer checklist, comments, metrics and verdict
//! - `Candidate` / `Round` / `Forecast`: per-candidate results
//! - `RunState` / `RunEvent`: run snapshot and event stream records

pub mod candidate;
pub mod draft;
pub mod error;
pub mod review;
pub mod run;

pub use candidate::{Candidate, Forecast, Phase, Round, TerminalState};
pub use draft::Draft;
pub use error::{
    GenerationError, IndexError, PersistenceError, Result, SimError, ValidationError,
};
pub use review::{
    CheckStatus, CheckboxStatus, ReviewComment, ReviewMetric, ReviewResult, Severity, Verdict,
    METRIC_SCALE,
};
pub use run::{EventType, RunEvent, RunState, RunStatus};
