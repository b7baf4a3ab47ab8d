//! Outcome of a replay run.

use crate::error::{ReplayError, RetraceError};
use crate::instrument::{CallProfile, UnsupportedCalls};
use crate::snapshot::StateSnapshot;
use glreplay_core::RunId;
use serde::{Deserialize, Serialize};

/// Why a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The stream was exhausted
    Completed,
    /// A stop was requested between calls
    Stopped,
    /// The snapshot was taken and the run stopped after it
    CaptureReached,
    /// The configured call limit was reached
    CallLimit,
    /// A fatal error ended the run
    Aborted(RetraceError),
}

/// Aggregate result of a full or partial replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Run id
    pub run_id: RunId,
    /// Why the run ended
    pub status: RunStatus,
    /// Frames completed
    pub frames_completed: u64,
    /// Calls pulled from the stream and dispatched
    pub calls_replayed: u64,
    /// Errors in the order they were recorded
    pub errors: Vec<RetraceError>,
    /// Calls no table could handle
    pub unsupported: UnsupportedCalls,
    /// Snapshot, if one was taken
    pub snapshot: Option<StateSnapshot>,
    /// Per-call timings when profiling
    pub profile: Vec<CallProfile>,
}

impl RunResult {
    /// Whether the run ended without a fatal error
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.is_aborted()
    }

    /// Whether a fatal error ended the run
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, RunStatus::Aborted(_))
    }

    /// Whether any error was recorded
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Errors recorded against one call
    pub fn errors_at(&self, call_index: u64) -> impl Iterator<Item = &RetraceError> {
        self.errors.iter().filter(move |e| e.call_index == call_index)
    }

    /// Turn an aborted run into an error
    ///
    /// # Errors
    ///
    /// Returns `ReplayError::Aborted` if the run was aborted
    pub fn into_result(self) -> Result<RunResult, ReplayError> {
        match &self.status {
            RunStatus::Aborted(err) => Err(ReplayError::Aborted(err.clone())),
            _ => Ok(self),
        }
    }
}
