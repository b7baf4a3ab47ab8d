//! glreplay Core Types
//!
//! This crate contains pure types and logic with no I/O: captured call
//! records, their argument values, and the identifiers shared by the
//! replay engine and its callers.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod call;
pub mod error;
pub mod id;

// Re-exports
pub use call::{Call, Value};
pub use error::{CoreError, CoreResult};
pub use id::{ContextId, DrawableId, GroupId, RunId, ThreadId, TraceHandle};
