//! Rendering-state snapshots.
//!
//! The engine only decides when to capture; what a snapshot contains is up
//! to the `StateCapture` implementation it was given.

use crate::backend::Backend;
use crate::thread_state::ThreadState;
use chrono::{DateTime, Utc};
use glreplay_core::{Call, ThreadId};
use serde::{Deserialize, Serialize};

/// State capture error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// Capture needs a current context and none is bound
    #[error("no context is current on {0}")]
    NoCurrentContext(ThreadId),

    /// Collaborator failure
    #[error("state capture failed: {0}")]
    Failed(String),
}

/// Everything a capture can look at
pub struct CaptureRequest<'a> {
    /// Call the snapshot is tagged with
    pub call: &'a Call,
    /// Backend, for driver-visible state of the calling thread
    pub backend: &'a dyn Backend,
    /// Replay thread the capture runs on
    pub thread: &'a ThreadState,
}

/// Produces a structured dump of driver-visible state.
///
/// Called on the replay thread that owns `request.thread`, right after
/// the tagged call executed.
pub trait StateCapture: Send + Sync {
    /// Capture the current state
    ///
    /// # Errors
    ///
    /// Returns error if the state cannot be read
    fn capture(&self, request: &CaptureRequest<'_>) -> Result<serde_json::Value, CaptureError>;
}

/// Capture built from the handle registry view plus the backend's own dump
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendStateCapture;

impl StateCapture for BackendStateCapture {
    fn capture(&self, request: &CaptureRequest<'_>) -> Result<serde_json::Value, CaptureError> {
        let context = request.thread.current_context().map(|c| {
            serde_json::json!({
                "id": c.id().as_u64(),
                "handle": c.handle().as_u64(),
                "active_program": c.active_program(),
                "shared_group": c.shared_group().map(|g| g.as_u64()),
            })
        });
        let drawable = request.thread.current_drawable().map(|d| {
            let (width, height) = d.size();
            serde_json::json!({
                "id": d.id().as_u64(),
                "handle": d.handle().as_u64(),
                "width": width,
                "height": height,
                "double_buffered": d.is_double_buffered(),
            })
        });
        Ok(serde_json::json!({
            "call": request.call.name,
            "thread": request.thread.thread().as_u32(),
            "context": context,
            "drawable": drawable,
            "driver": request.backend.dump_state(),
        }))
    }
}

/// State captured at a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Index of the call the snapshot was taken after
    pub call_index: u64,
    /// Replay thread that took it
    pub thread: ThreadId,
    /// Wall-clock capture time
    pub captured_at: DateTime<Utc>,
    /// Captured state
    pub state: serde_json::Value,
}

impl StateSnapshot {
    /// Create a snapshot stamped with the current time
    #[must_use]
    pub fn new(call_index: u64, thread: ThreadId, state: serde_json::Value) -> Self {
        Self {
            call_index,
            thread,
            captured_at: Utc::now(),
            state,
        }
    }

    /// Pretty JSON rendering
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
