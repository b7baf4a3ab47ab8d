//! Call instrumentation: driver error checks, frame accounting and profiling.
//!
//! Instrumentation observes calls and never changes which native calls are
//! issued or in what order.

use crate::backend::{error_code_name, Backend, ErrorState, QueryId};
use crate::error::RetraceError;
use crate::thread_state::ThreadState;
use glreplay_core::Call;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Monotonic frame counter, shareable with progress observers
#[derive(Debug, Clone, Default)]
pub struct FrameCounter(Arc<AtomicU64>);

impl FrameCounter {
    /// Create a counter at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames completed so far
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Timing of one dispatched call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallProfile {
    /// Call index
    pub call_index: u64,
    /// Call name
    pub name: String,
    /// Whether the call was profiled as a draw
    pub is_draw: bool,
    /// CPU time spent in the handler
    pub cpu_ns: u64,
    /// GPU time, once the query has been resolved
    pub gpu_ns: Option<u64>,
}

/// Open profiling bracket returned by `begin_profile`
#[derive(Debug)]
#[must_use = "pass the bracket to end_profile"]
pub struct ProfileBracket {
    call_index: u64,
    name: String,
    is_draw: bool,
    start: Instant,
    query: Option<QueryId>,
}

#[derive(Debug, Default)]
struct Profiler {
    records: Vec<CallProfile>,
    pending: Vec<(usize, QueryId)>,
}

/// Calls that no registered family could handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedCalls {
    /// Total skipped calls
    pub count: u64,
    /// Skip count per call name, in order of first appearance
    pub by_name: IndexMap<String, u64>,
}

impl UnsupportedCalls {
    /// Count one skipped call; returns true the first time a name is seen
    pub fn record(&mut self, name: &str) -> bool {
        self.count += 1;
        match self.by_name.get_mut(name) {
            Some(n) => {
                *n += 1;
                false
            }
            None => {
                self.by_name.insert(name.to_string(), 1);
                true
            }
        }
    }
}

/// Per-run instrumentation shared by every replay thread
pub struct Instrumentation {
    benchmarking: bool,
    profiling: bool,
    errors: Mutex<Vec<RetraceError>>,
    unsupported: Mutex<UnsupportedCalls>,
    profiler: Mutex<Profiler>,
    frames: FrameCounter,
}

impl Instrumentation {
    /// Create instrumentation for one run
    #[must_use]
    pub fn new(benchmarking: bool, profiling: bool, frames: FrameCounter) -> Self {
        Self {
            benchmarking,
            profiling,
            errors: Mutex::new(Vec::new()),
            unsupported: Mutex::new(UnsupportedCalls::default()),
            profiler: Mutex::new(Profiler::default()),
            frames,
        }
    }

    /// Whether error checks are suppressed
    #[must_use]
    pub fn is_benchmarking(&self) -> bool {
        self.benchmarking
    }

    /// Query the driver error state after `call` and record a driver error.
    ///
    /// Skipped entirely in benchmarking mode, on unbound threads and
    /// between `glBegin`/`glEnd`.
    pub fn check_error(&self, backend: &dyn Backend, state: &ThreadState, call: &Call) {
        if self.benchmarking || !state.is_bound() || state.inside_begin_end {
            return;
        }
        if let ErrorState::Code(code) = backend.query_error() {
            let message = error_code_name(code);
            tracing::warn!(call = call.index, name = %call.name, error = %message, "driver error");
            self.record_error(RetraceError::driver(call.index, message));
        }
    }

    /// Append an error to the run's error list
    pub fn record_error(&self, error: RetraceError) {
        lock(&self.errors).push(error);
    }

    /// Count a call no family could handle
    pub fn record_unsupported(&self, call: &Call) {
        if lock(&self.unsupported).record(&call.name) {
            tracing::warn!(call = call.index, name = %call.name, "unsupported call");
        }
    }

    /// Count a completed frame; returns the new frame count
    pub fn frame_completed(&self) -> u64 {
        self.frames.increment()
    }

    /// Frames completed in this run
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames.get()
    }

    /// Open a profiling bracket around `call`
    pub fn begin_profile(
        &self,
        backend: &dyn Backend,
        call: &Call,
        is_draw: bool,
    ) -> Option<ProfileBracket> {
        if !self.profiling {
            return None;
        }
        let query = if is_draw {
            backend.begin_query(call.index)
        } else {
            None
        };
        Some(ProfileBracket {
            call_index: call.index,
            name: call.name.clone(),
            is_draw,
            start: Instant::now(),
            query,
        })
    }

    /// Close a profiling bracket opened by `begin_profile`
    pub fn end_profile(&self, backend: &dyn Backend, bracket: Option<ProfileBracket>) {
        let Some(bracket) = bracket else {
            return;
        };
        let cpu_ns = u64::try_from(bracket.start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        if let Some(query) = bracket.query {
            backend.end_query(query);
        }
        let mut profiler = lock(&self.profiler);
        let slot = profiler.records.len();
        profiler.records.push(CallProfile {
            call_index: bracket.call_index,
            name: bracket.name,
            is_draw: bracket.is_draw,
            cpu_ns,
            gpu_ns: None,
        });
        if let Some(query) = bracket.query {
            profiler.pending.push((slot, query));
        }
    }

    /// Resolve GPU queries whose results are available
    pub fn flush_queries(&self, backend: &dyn Backend) {
        let mut profiler = lock(&self.profiler);
        let pending = std::mem::take(&mut profiler.pending);
        for (slot, query) in pending {
            match backend.query_result(query) {
                Some(ns) => {
                    if let Some(record) = profiler.records.get_mut(slot) {
                        record.gpu_ns = Some(ns);
                    }
                }
                None => profiler.pending.push((slot, query)),
            }
        }
    }

    /// Errors recorded so far, in order
    #[must_use]
    pub fn errors(&self) -> Vec<RetraceError> {
        lock(&self.errors).clone()
    }

    /// Unsupported call counts
    #[must_use]
    pub fn unsupported(&self) -> UnsupportedCalls {
        lock(&self.unsupported).clone()
    }

    /// Profile records, in call order
    #[must_use]
    pub fn profile(&self) -> Vec<CallProfile> {
        lock(&self.profiler).records.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::handles::HandleRegistry;
    use glreplay_core::{ThreadId, TraceHandle};

    fn bound_state(backend: &Arc<HeadlessBackend>, registry: &HandleRegistry) -> ThreadState {
        let handle = TraceHandle::from_raw(1);
        let mut state = ThreadState::new(ThreadId::default());
        state
            .make_current(
                &**backend,
                registry.get_or_create_drawable(handle).unwrap(),
                registry.get_or_create_context(handle, None).unwrap(),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_check_error_records_driver_error() {
        let backend = Arc::new(HeadlessBackend::new());
        let registry = HandleRegistry::new(backend.clone(), true);
        let state = bound_state(&backend, &registry);
        let inst = Instrumentation::new(false, false, FrameCounter::new());

        backend.inject_error(0x0501);
        inst.check_error(&*backend, &state, &Call::new(9, "glTexImage2D"));

        let errors = inst.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], RetraceError::driver(9, "GL_INVALID_VALUE"));
    }

    #[test]
    fn test_benchmarking_never_queries() {
        let backend = Arc::new(HeadlessBackend::new());
        let registry = HandleRegistry::new(backend.clone(), true);
        let state = bound_state(&backend, &registry);
        let inst = Instrumentation::new(true, false, FrameCounter::new());

        backend.inject_error(0x0502);
        inst.check_error(&*backend, &state, &Call::new(1, "glDrawArrays"));
        assert!(inst.errors().is_empty());
        // the error stays pending in the driver
        assert_eq!(backend.query_error(), ErrorState::Code(0x0502));
    }

    #[test]
    fn test_no_check_when_unbound_or_inside_begin_end() {
        let backend = Arc::new(HeadlessBackend::new());
        let registry = HandleRegistry::new(backend.clone(), true);
        let inst = Instrumentation::new(false, false, FrameCounter::new());

        backend.inject_error(0x0500);
        inst.check_error(&*backend, &ThreadState::new(ThreadId::default()), &Call::new(0, "glClear"));
        assert!(inst.errors().is_empty());

        let mut state = bound_state(&backend, &registry);
        state.inside_begin_end = true;
        inst.check_error(&*backend, &state, &Call::new(1, "glVertex3f"));
        assert!(inst.errors().is_empty());
    }

    #[test]
    fn test_frame_counter_shared() {
        let frames = FrameCounter::new();
        let inst = Instrumentation::new(false, false, frames.clone());
        assert_eq!(inst.frame_completed(), 1);
        assert_eq!(inst.frame_completed(), 2);
        assert_eq!(frames.get(), 2);
        frames.reset();
        assert_eq!(inst.frames(), 0);
    }

    #[test]
    fn test_unsupported_counts() {
        let inst = Instrumentation::new(false, false, FrameCounter::new());
        inst.record_unsupported(&Call::new(0, "glFooEXT"));
        inst.record_unsupported(&Call::new(1, "glFooEXT"));
        inst.record_unsupported(&Call::new(2, "glBarEXT"));
        let unsupported = inst.unsupported();
        assert_eq!(unsupported.count, 3);
        assert_eq!(unsupported.by_name.get("glFooEXT"), Some(&2));
        assert_eq!(
            unsupported.by_name.keys().collect::<Vec<_>>(),
            vec!["glFooEXT", "glBarEXT"]
        );
    }

    #[test]
    fn test_profiling_disabled_records_nothing() {
        let backend = HeadlessBackend::new();
        let inst = Instrumentation::new(false, false, FrameCounter::new());
        let bracket = inst.begin_profile(&backend, &Call::new(0, "glDrawArrays"), true);
        assert!(bracket.is_none());
        inst.end_profile(&backend, bracket);
        assert!(inst.profile().is_empty());
    }

    #[test]
    fn test_profiling_draw_resolves_gpu_time() {
        let backend = HeadlessBackend::new();
        let inst = Instrumentation::new(false, true, FrameCounter::new());

        let bracket = inst.begin_profile(&backend, &Call::new(0, "glClear"), false);
        inst.end_profile(&backend, bracket);
        let bracket = inst.begin_profile(&backend, &Call::new(1, "glDrawArrays"), true);
        inst.end_profile(&backend, bracket);

        let profile = inst.profile();
        assert_eq!(profile.len(), 2);
        assert!(!profile[0].is_draw);
        assert!(profile[1].is_draw);
        assert_eq!(profile[1].gpu_ns, None);

        inst.flush_queries(&backend);
        let profile = inst.profile();
        assert_eq!(profile[0].gpu_ns, None);
        assert!(profile[1].gpu_ns.is_some());
    }
}
