//! glreplay Retrace Engine
//!
//! Re-executes a captured graphics-API call stream against a live backend.
//! Trace handles are virtualized onto native contexts and drawables, each
//! call is routed through per-family dispatch tables, and driver errors,
//! frames and per-call timings are collected along the way.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod families;
pub mod handles;
pub mod instrument;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod thread_state;
pub mod trace;

pub use backend::{Backend, BackendOp, DrawableDesc, HeadlessBackend, NativeBinding, NativeHandle};
pub use config::{ReplayConfig, ThreadMode};
pub use dispatch::{CallTable, DispatchRegistry, Family};
pub use engine::{ReplayEngine, StopHandle};
pub use error::{BackendError, CallError, ReplayError, RetraceError, RetraceErrorKind};
pub use handles::{Context, Drawable, HandleRegistry};
pub use instrument::{CallProfile, FrameCounter, UnsupportedCalls};
pub use session::Session;
pub use snapshot::{BackendStateCapture, CaptureError, StateCapture, StateSnapshot};
pub use state::{RunResult, RunStatus};
pub use thread_state::ThreadState;
pub use trace::{CallIter, CallStream, TraceReader};
