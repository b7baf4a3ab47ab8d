//! Identifiers used during replay.
//!
//! Trace-side identifiers (`TraceHandle`, `ThreadId`) are the raw values
//! recorded at capture time. Replay-side identifiers (`ContextId`,
//! `DrawableId`, `GroupId`) are allocated sequentially by the engine so
//! that two replays of the same stream allocate identical ids.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Run identifier - identifies a single replay run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random RunId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get as UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Opaque pointer-sized handle recorded in the trace.
///
/// Zero is the null handle and never maps to a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceHandle(u64);

impl TraceHandle {
    /// The null handle
    pub const NULL: Self = Self(0);

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

    /// Whether this is the null handle
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TraceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u64> for TraceHandle {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Thread id recorded at capture time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "thread_{}", self.0)
    }
}

/// Live context identifier, allocated in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
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

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx_{}", self.0)
    }
}

/// Live drawable identifier, allocated in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrawableId(u64);

impl DrawableId {
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

impl std::fmt::Display for DrawableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "drawable_{}", self.0)
    }
}

/// Shared-group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(u64);

impl GroupId {
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

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_unique() {
        let id1 = RunId::new();
        let id2 = RunId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("run_"));
    }

    #[test]
    fn test_trace_handle_null() {
        assert!(TraceHandle::NULL.is_null());
        assert!(TraceHandle::from_raw(0).is_null());
        assert!(!TraceHandle::from_raw(0x1).is_null());
    }

    #[test]
    fn test_trace_handle_display() {
        let handle = TraceHandle::from_raw(0x7f00);
        assert_eq!(handle.to_string(), "0x7f00");
    }

    #[test]
    fn test_trace_handle_serializes_as_number() {
        let handle = TraceHandle::from_raw(42);
        assert_eq!(serde_json::to_string(&handle).unwrap(), "42");
    }

    #[test]
    fn test_sequential_ids_order() {
        assert!(ContextId::from_raw(1) < ContextId::from_raw(2));
        assert_eq!(DrawableId::from_raw(3).to_string(), "drawable_3");
        assert_eq!(GroupId::from_raw(1).to_string(), "group_1");
        assert_eq!(ThreadId::from_raw(7).to_string(), "thread_7");
    }
}
