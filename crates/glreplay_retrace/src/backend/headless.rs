//! Headless backend.
//!
//! Keeps native objects as bookkeeping entries instead of windowing-system
//! resources and records every native operation in order. Used by the CLI
//! for dry runs and by tests, which can inject driver errors and creation
//! failures.

use super::{Backend, DrawableDesc, ErrorState, NativeBinding, NativeHandle, QueryId};
use crate::error::BackendError;
use glreplay_core::Call;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Native operation observed by the headless backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    /// Context created
    CreateContext {
        /// New native handle
        native: NativeHandle,
        /// Context it shares with
        share: Option<NativeHandle>,
    },
    /// Drawable created
    CreateDrawable {
        /// New native handle
        native: NativeHandle,
        /// Creation parameters
        desc: DrawableDesc,
    },
    /// Context destroyed
    DestroyContext(NativeHandle),
    /// Drawable destroyed
    DestroyDrawable(NativeHandle),
    /// Bind or unbind on the calling thread
    MakeCurrent(Option<NativeBinding>),
    /// Buffer swap
    SwapBuffers(NativeHandle),
    /// Command flush
    Flush,
    /// Drawable resize
    Resize {
        /// Drawable
        drawable: NativeHandle,
        /// New width
        width: u32,
        /// New height
        height: u32,
    },
    /// Core API call issued
    Execute {
        /// Call index
        call_index: u64,
        /// Call name
        name: String,
        /// Context current on the issuing thread
        context: Option<NativeHandle>,
    },
}

#[derive(Default)]
struct HeadlessState {
    next_native: u64,
    next_query: u64,
    contexts: BTreeMap<NativeHandle, Option<NativeHandle>>,
    drawables: BTreeMap<NativeHandle, DrawableDesc>,
    current: HashMap<std::thread::ThreadId, NativeBinding>,
    ops: Vec<BackendOp>,
    pending_error: Option<u32>,
    error_on: HashMap<String, u32>,
    fail_context_creation: bool,
    fail_drawable_creation: bool,
    open_queries: HashMap<QueryId, Instant>,
    query_results: HashMap<QueryId, u64>,
}

impl HeadlessState {
    fn allocate(&mut self) -> NativeHandle {
        self.next_native += 1;
        NativeHandle::from_raw(self.next_native)
    }

    fn current_here(&self) -> Option<NativeBinding> {
        self.current.get(&std::thread::current().id()).copied()
    }
}

/// Backend with no windowing system behind it
#[derive(Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
    /// Create a new headless backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `code` as the driver error after every call named `name`
    #[must_use]
    pub fn with_error_on(self, name: impl Into<String>, code: u32) -> Self {
        self.state().error_on.insert(name.into(), code);
        self
    }

    /// Make every context creation fail
    #[must_use]
    pub fn with_failing_context_creation(self) -> Self {
        self.state().fail_context_creation = true;
        self
    }

    /// Make every drawable creation fail
    #[must_use]
    pub fn with_failing_drawable_creation(self) -> Self {
        self.state().fail_drawable_creation = true;
        self
    }

    /// Set a pending driver error, reported by the next error query
    pub fn inject_error(&self, code: u32) {
        self.state().pending_error = Some(code);
    }

    /// Every native operation so far, in order
    #[must_use]
    pub fn ops(&self) -> Vec<BackendOp> {
        self.state().ops.clone()
    }

    /// Number of live native contexts
    #[must_use]
    pub fn live_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    /// Number of live native drawables
    #[must_use]
    pub fn live_drawables(&self) -> usize {
        self.state().drawables.len()
    }

    /// Binding of the calling thread
    #[must_use]
    pub fn current_binding(&self) -> Option<NativeBinding> {
        self.state().current_here()
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_context(&self, share: Option<NativeHandle>) -> Result<NativeHandle, BackendError> {
        let mut state = self.state();
        if state.fail_context_creation {
            return Err(BackendError::ContextCreation(
                "context creation disabled".to_string(),
            ));
        }
        if let Some(share) = share {
            if !state.contexts.contains_key(&share) {
                return Err(BackendError::UnknownNative(share));
            }
        }
        let native = state.allocate();
        state.contexts.insert(native, share);
        state.ops.push(BackendOp::CreateContext { native, share });
        Ok(native)
    }

    fn create_drawable(&self, desc: DrawableDesc) -> Result<NativeHandle, BackendError> {
        let mut state = self.state();
        if state.fail_drawable_creation {
            return Err(BackendError::DrawableCreation(
                "drawable creation disabled".to_string(),
            ));
        }
        let native = state.allocate();
        state.drawables.insert(native, desc);
        state.ops.push(BackendOp::CreateDrawable { native, desc });
        Ok(native)
    }

    fn destroy_context(&self, context: NativeHandle) {
        let mut state = self.state();
        state.contexts.remove(&context);
        state.ops.push(BackendOp::DestroyContext(context));
    }

    fn destroy_drawable(&self, drawable: NativeHandle) {
        let mut state = self.state();
        state.drawables.remove(&drawable);
        state.ops.push(BackendOp::DestroyDrawable(drawable));
    }

    fn make_current(&self, binding: Option<NativeBinding>) -> Result<(), BackendError> {
        let mut state = self.state();
        let thread = std::thread::current().id();
        match binding {
            Some(b) => {
                if !state.contexts.contains_key(&b.context) {
                    return Err(BackendError::UnknownNative(b.context));
                }
                if !state.drawables.contains_key(&b.drawable) {
                    return Err(BackendError::UnknownNative(b.drawable));
                }
                let elsewhere = state
                    .current
                    .iter()
                    .any(|(t, other)| *t != thread && other.context == b.context);
                if elsewhere {
                    return Err(BackendError::MakeCurrent(format!(
                        "{} is current on another thread",
                        b.context
                    )));
                }
                state.current.insert(thread, b);
            }
            None => {
                state.current.remove(&thread);
            }
        }
        state.ops.push(BackendOp::MakeCurrent(binding));
        Ok(())
    }

    fn swap_buffers(&self, drawable: NativeHandle) {
        self.state().ops.push(BackendOp::SwapBuffers(drawable));
    }

    fn flush(&self) {
        self.state().ops.push(BackendOp::Flush);
    }

    fn resize_drawable(&self, drawable: NativeHandle, width: u32, height: u32) {
        let mut state = self.state();
        if let Some(desc) = state.drawables.get_mut(&drawable) {
            desc.width = width;
            desc.height = height;
        }
        state.ops.push(BackendOp::Resize {
            drawable,
            width,
            height,
        });
    }

    fn execute(&self, call: &Call) {
        let mut state = self.state();
        let context = state.current_here().map(|b| b.context);
        if let Some(code) = state.error_on.get(&call.name).copied() {
            state.pending_error = Some(code);
        }
        state.ops.push(BackendOp::Execute {
            call_index: call.index,
            name: call.name.clone(),
            context,
        });
    }

    fn query_error(&self) -> ErrorState {
        match self.state().pending_error.take() {
            Some(code) => ErrorState::Code(code),
            None => ErrorState::Nominal,
        }
    }

    fn begin_query(&self, _call_index: u64) -> Option<QueryId> {
        let mut state = self.state();
        state.next_query += 1;
        let query = QueryId(state.next_query);
        state.open_queries.insert(query, Instant::now());
        Some(query)
    }

    fn end_query(&self, query: QueryId) {
        let mut state = self.state();
        if let Some(start) = state.open_queries.remove(&query) {
            let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
            state.query_results.insert(query, elapsed);
        }
    }

    fn query_result(&self, query: QueryId) -> Option<u64> {
        self.state().query_results.remove(&query)
    }

    fn dump_state(&self) -> serde_json::Value {
        let state = self.state();
        let current = state.current_here().map(|b| {
            serde_json::json!({
                "context": b.context.as_u64(),
                "drawable": b.drawable.as_u64(),
            })
        });
        let drawables: Vec<_> = state
            .drawables
            .iter()
            .map(|(native, desc)| {
                serde_json::json!({
                    "native": native.as_u64(),
                    "width": desc.width,
                    "height": desc.height,
                    "double_buffered": desc.double_buffered,
                })
            })
            .collect();
        serde_json::json!({
            "backend": "headless",
            "current": current,
            "contexts": state.contexts.len(),
            "drawables": drawables,
            "calls_executed": state
                .ops
                .iter()
                .filter(|op| matches!(op, BackendOp::Execute { .. }))
                .count(),
        })
    }
}
