//! Error types for the replay engine.
//!
//! Per-call failures are recorded as `RetraceError`s and replay moves on;
//! only setup failures, stream failures and lost workers end a run.

use crate::backend::NativeHandle;
use crate::dispatch::Family;
use glreplay_core::CoreError;
use serde::{Deserialize, Serialize};

/// Failure reported by a backend adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Native context creation failed
    #[error("context creation failed: {0}")]
    ContextCreation(String),

    /// Native drawable creation failed
    #[error("drawable creation failed: {0}")]
    DrawableCreation(String),

    /// Native bind failed
    #[error("make current failed: {0}")]
    MakeCurrent(String),

    /// Handle does not name a live native object
    #[error("unknown native handle {0}")]
    UnknownNative(NativeHandle),
}

/// Failure of a single call handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Argument count or type does not match the handler
    #[error("malformed call: {0}")]
    Malformed(#[from] CoreError),

    /// Native object creation failed
    #[error("setup failure: {0}")]
    Setup(#[from] BackendError),
}

/// Failure to resolve a call name to a handler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No registered family knows the name
    #[error("unsupported call: {name}")]
    NotFound {
        /// Call name
        name: String,
    },

    /// Call belongs to a windowing-system family other than the active one
    #[error("call {name} belongs to {requested}, but {active} is active")]
    FamilyConflict {
        /// Call name
        name: String,
        /// Family already active for this run
        active: Family,
        /// Family the call belongs to
        requested: Family,
    },
}

/// Kind of a recorded replay error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetraceErrorKind {
    /// Driver reported a non-nominal error state after the call
    Driver,
    /// Argument count or type mismatch
    Malformed,
    /// Native context or drawable creation failed
    Setup,
    /// State capture failed
    Capture,
    /// The call stream could not produce the next call
    Stream,
    /// A replay worker thread could not be started or exited early
    Worker,
}

impl RetraceErrorKind {
    /// Short lowercase name, as shown next to the call index
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::Malformed => "malformed",
            Self::Setup => "setup",
            Self::Capture => "capture",
            Self::Stream => "stream",
            Self::Worker => "worker",
        }
    }
}

impl std::fmt::Display for RetraceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded during a run, correlated to a call index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetraceError {
    /// Index of the call that produced the error
    pub call_index: u64,
    /// Error kind
    pub kind: RetraceErrorKind,
    /// Human-readable message
    pub message: String,
}

impl RetraceError {
    /// Create a new error
    #[must_use]
    pub fn new(call_index: u64, kind: RetraceErrorKind, message: impl Into<String>) -> Self {
        Self {
            call_index,
            kind,
            message: message.into(),
        }
    }

    /// Driver error
    #[must_use]
    pub fn driver(call_index: u64, message: impl Into<String>) -> Self {
        Self::new(call_index, RetraceErrorKind::Driver, message)
    }
}

impl std::fmt::Display for RetraceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.call_index, self.kind, self.message)
    }
}

impl std::error::Error for RetraceError {}

/// Run-level failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The run was aborted by a fatal error
    #[error("replay aborted at call {}: {}", .0.call_index, .0.message)]
    Aborted(RetraceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrace_error_display() {
        let err = RetraceError::driver(12, "GL_INVALID_OPERATION");
        assert_eq!(err.to_string(), "12: driver: GL_INVALID_OPERATION");
    }

    #[test]
    fn test_call_error_from_core() {
        let err: CallError = CoreError::MissingReturn {
            call: "eglCreateContext".to_string(),
        }
        .into();
        assert!(matches!(err, CallError::Malformed(_)));
        assert!(err.to_string().starts_with("malformed call"));
    }

    #[test]
    fn test_call_error_from_backend() {
        let err: CallError = BackendError::ContextCreation("no visual".to_string()).into();
        assert_eq!(
            err.to_string(),
            "setup failure: context creation failed: no visual"
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&RetraceErrorKind::Driver).unwrap();
        assert_eq!(json, "\"driver\"");
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::FamilyConflict {
            name: "wglMakeCurrent".to_string(),
            active: Family::Glx,
            requested: Family::Wgl,
        };
        assert_eq!(
            err.to_string(),
            "call wglMakeCurrent belongs to WGL, but GLX is active"
        );
    }

    #[test]
    fn test_replay_error_display() {
        let err = ReplayError::Aborted(RetraceError::new(
            4,
            RetraceErrorKind::Setup,
            "context creation failed",
        ));
        assert_eq!(
            err.to_string(),
            "replay aborted at call 4: context creation failed"
        );
    }
}
