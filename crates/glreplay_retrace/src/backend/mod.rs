//! Backend adapter: the engine's only path to native contexts and drawables.
//!
//! A backend wraps one windowing system (CGL, GLX, WGL or EGL) plus the
//! driver behind it. The replay core never names a concrete backend; it
//! is handed an `Arc<dyn Backend>` chosen at runtime.

mod headless;

pub use headless::{BackendOp, HeadlessBackend};

use crate::error::BackendError;
use glreplay_core::Call;
use serde::{Deserialize, Serialize};

/// Opaque native object handle allocated by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native_{}", self.0)
    }
}

/// GPU timer query handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub u64);

/// Driver error state after a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorState {
    /// No error pending
    Nominal,
    /// Driver error code
    Code(u32),
}

/// Parameters for a new native drawable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawableDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Whether the drawable has a back buffer
    pub double_buffered: bool,
}

/// Native binding for the calling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBinding {
    /// Drawable to bind
    pub drawable: NativeHandle,
    /// Context to bind
    pub context: NativeHandle,
}

/// Capability set the engine needs from a windowing system and driver.
///
/// `make_current` and `execute` act on the calling OS thread, like the
/// native APIs they stand for.
pub trait Backend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Create a native context, optionally sharing object namespaces
    ///
    /// # Errors
    ///
    /// Returns error if the native context cannot be created
    fn create_context(&self, share: Option<NativeHandle>) -> Result<NativeHandle, BackendError>;

    /// Create a native drawable
    ///
    /// # Errors
    ///
    /// Returns error if the native drawable cannot be created
    fn create_drawable(&self, desc: DrawableDesc) -> Result<NativeHandle, BackendError>;

    /// Destroy a native context
    fn destroy_context(&self, context: NativeHandle);

    /// Destroy a native drawable
    fn destroy_drawable(&self, drawable: NativeHandle);

    /// Bind a drawable and context to the calling thread, or unbind with `None`
    ///
    /// # Errors
    ///
    /// Returns error if the native bind fails
    fn make_current(&self, binding: Option<NativeBinding>) -> Result<(), BackendError>;

    /// Present the back buffer of a drawable
    fn swap_buffers(&self, drawable: NativeHandle);

    /// Flush the current context's command stream
    fn flush(&self);

    /// Resize a drawable
    fn resize_drawable(&self, drawable: NativeHandle, width: u32, height: u32);

    /// Issue a core API call on the calling thread's current context
    fn execute(&self, call: &Call);

    /// Query and clear the driver error state
    fn query_error(&self) -> ErrorState;

    /// Open a GPU timer query for a call
    fn begin_query(&self, _call_index: u64) -> Option<QueryId> {
        None
    }

    /// Close a GPU timer query
    fn end_query(&self, _query: QueryId) {}

    /// Elapsed GPU nanoseconds for a closed query, once available
    fn query_result(&self, _query: QueryId) -> Option<u64> {
        None
    }

    /// Driver-visible state of the calling thread, for snapshots
    fn dump_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Name of a GL error code
#[must_use]
pub fn error_code_name(code: u32) -> String {
    match code {
        0x0500 => "GL_INVALID_ENUM".to_string(),
        0x0501 => "GL_INVALID_VALUE".to_string(),
        0x0502 => "GL_INVALID_OPERATION".to_string(),
        0x0503 => "GL_STACK_OVERFLOW".to_string(),
        0x0504 => "GL_STACK_UNDERFLOW".to_string(),
        0x0505 => "GL_OUT_OF_MEMORY".to_string(),
        0x0506 => "GL_INVALID_FRAMEBUFFER_OPERATION".to_string(),
        other => format!("0x{:04X}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_name() {
        assert_eq!(error_code_name(0x0502), "GL_INVALID_OPERATION");
        assert_eq!(error_code_name(0x0505), "GL_OUT_OF_MEMORY");
        assert_eq!(error_code_name(0x8031), "0x8031");
    }

    #[test]
    fn test_native_handle_display() {
        assert_eq!(NativeHandle::from_raw(3).to_string(), "native_3");
    }
}
