//! Replay session: everything one run shares across its replay threads.
//!
//! Handlers receive the session and the calling thread's `ThreadState`;
//! they never reach for globals.

use crate::backend::Backend;
use crate::config::ReplayConfig;
use crate::dispatch::{DispatchRegistry, Entry, EntryKind, Family};
use crate::error::{CallError, DispatchError, RetraceError, RetraceErrorKind};
use crate::handles::{Context, Drawable, HandleRegistry};
use crate::instrument::{FrameCounter, Instrumentation};
use crate::snapshot::{CaptureRequest, StateCapture, StateSnapshot};
use crate::thread_state::{ThreadState, Transition};
use glreplay_core::{Call, RunId};
use std::sync::{Arc, OnceLock};

/// Shared state of one replay run
pub struct Session {
    run_id: RunId,
    config: ReplayConfig,
    backend: Arc<dyn Backend>,
    registry: HandleRegistry,
    instrumentation: Instrumentation,
    dispatch: Arc<DispatchRegistry>,
    capture: Arc<dyn StateCapture>,
    family: OnceLock<Family>,
}

impl Session {
    /// Create a session for one run
    #[must_use]
    pub fn new(
        run_id: RunId,
        config: ReplayConfig,
        backend: Arc<dyn Backend>,
        dispatch: Arc<DispatchRegistry>,
        capture: Arc<dyn StateCapture>,
        frames: FrameCounter,
    ) -> Self {
        let family = OnceLock::new();
        if let Some(forced) = config.family.filter(Family::is_windowing) {
            let _ = family.set(forced);
        }
        Self {
            run_id,
            registry: HandleRegistry::new(Arc::clone(&backend), config.double_buffered),
            instrumentation: Instrumentation::new(config.benchmarking, config.profiling, frames),
            config,
            backend,
            dispatch,
            capture,
            family,
        }
    }

    /// Run id
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Backend adapter
    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    /// Handle registry
    #[must_use]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Instrumentation
    #[must_use]
    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    /// Active windowing-system family, once chosen
    #[must_use]
    pub fn active_family(&self) -> Option<Family> {
        self.family.get().copied()
    }

    /// Resolve a call name to its entry.
    ///
    /// The first windowing-system call fixes the active family for the
    /// rest of the run.
    ///
    /// # Errors
    ///
    /// Returns error if no table has the name or the call belongs to a
    /// windowing-system family other than the active one
    pub fn route(&self, name: &str) -> Result<&Entry, DispatchError> {
        let Some(requested) = Family::detect(name) else {
            return self.dispatch.resolve(Family::Gl, name);
        };
        let active = *self.family.get_or_init(|| {
            tracing::info!(family = %requested, "windowing-system family selected");
            requested
        });
        if active != requested {
            return Err(DispatchError::FamilyConflict {
                name: name.to_string(),
                active,
                requested,
            });
        }
        self.dispatch.resolve(active, name)
    }

    /// Dispatch one call on the calling thread.
    ///
    /// Per-call failures are recorded and replay goes on; only a setup
    /// failure comes back as `Err` and ends the run.
    ///
    /// # Errors
    ///
    /// Returns error if a native context or drawable cannot be created
    pub fn execute(&self, state: &mut ThreadState, call: &Call) -> Result<(), RetraceError> {
        let entry = match self.route(&call.name) {
            Ok(entry) => entry,
            Err(DispatchError::NotFound { .. }) => {
                self.instrumentation.record_unsupported(call);
                return Ok(());
            }
            Err(err @ DispatchError::FamilyConflict { .. }) => {
                tracing::warn!(call = call.index, error = %err, "call from inactive family");
                self.instrumentation.record_unsupported(call);
                return Ok(());
            }
        };

        if self.config.verbose {
            tracing::debug!(thread = %state.thread(), "{call}");
        } else {
            tracing::trace!(thread = %state.thread(), "{call}");
        }

        let EntryKind::Handler(handler) = &entry.kind else {
            return Ok(());
        };

        let is_draw = entry.draw && !state.inside_list;
        let bracket = self
            .instrumentation
            .begin_profile(self.backend(), call, is_draw);
        let result = handler(self, state, call);
        self.instrumentation.end_profile(self.backend(), bracket);

        match result {
            Ok(()) => {
                self.instrumentation
                    .check_error(self.backend(), state, call);
                Ok(())
            }
            Err(CallError::Malformed(err)) => {
                tracing::warn!(call = call.index, error = %err, "malformed call");
                self.instrumentation.record_error(RetraceError::new(
                    call.index,
                    RetraceErrorKind::Malformed,
                    err.to_string(),
                ));
                Ok(())
            }
            Err(CallError::Setup(err)) => {
                tracing::error!(call = call.index, error = %err, "setup failure");
                Err(RetraceError::new(
                    call.index,
                    RetraceErrorKind::Setup,
                    err.to_string(),
                ))
            }
        }
    }

    /// Issue a core call to the backend unchanged
    pub fn issue(&self, call: &Call) {
        self.backend.execute(call);
    }

    /// Bind `drawable` and `context` on the calling thread, or unbind.
    ///
    /// A rejected native bind is recorded as a driver error against `call`
    /// and leaves the thread state unchanged.
    pub fn make_current(
        &self,
        state: &mut ThreadState,
        call: &Call,
        drawable: Option<Arc<Drawable>>,
        context: Option<Arc<Context>>,
    ) {
        match state.make_current(self.backend(), drawable, context) {
            Ok(Transition::Unbound) => {
                tracing::debug!(call = call.index, thread = %state.thread(), "unbound");
            }
            Ok(transition) => {
                if let Some(binding) = state.binding() {
                    tracing::debug!(
                        call = call.index,
                        thread = %state.thread(),
                        context = %binding.context.id(),
                        drawable = %binding.drawable.id(),
                        rebound = transition == Transition::Rebound,
                        "bound"
                    );
                }
            }
            Err(err) => {
                tracing::warn!(call = call.index, error = %err, "make current rejected");
                self.instrumentation
                    .record_error(RetraceError::driver(call.index, err.to_string()));
            }
        }
    }

    /// Complete a frame on `drawable`, or on the current drawable if `None`.
    ///
    /// The frame counts even when nothing is bound; then neither swap nor
    /// flush is issued.
    pub fn frame_complete(
        &self,
        state: &ThreadState,
        call: &Call,
        drawable: Option<Arc<Drawable>>,
    ) {
        let frame = self.instrumentation.frame_completed();
        self.instrumentation.flush_queries(self.backend());

        if !state.is_bound() {
            tracing::warn!(call = call.index, frame, "frame completed with no current context");
            return;
        }
        let Some(drawable) = drawable.or_else(|| state.current_drawable().cloned()) else {
            return;
        };
        if self.config.double_buffered {
            self.backend.swap_buffers(drawable.native());
        } else {
            self.backend.flush();
        }
        tracing::debug!(call = call.index, frame, drawable = %drawable.id(), "frame completed");
    }

    /// Take a state snapshot tagged with `call`'s index
    ///
    /// # Errors
    ///
    /// Returns a capture error if the state-capture collaborator fails
    pub fn capture(&self, state: &ThreadState, call: &Call) -> Result<StateSnapshot, RetraceError> {
        let request = CaptureRequest {
            call,
            backend: self.backend(),
            thread: state,
        };
        match self.capture.capture(&request) {
            Ok(value) => {
                tracing::info!(call = call.index, "state captured");
                Ok(StateSnapshot::new(call.index, state.thread(), value))
            }
            Err(err) => {
                tracing::warn!(call = call.index, error = %err, "state capture failed");
                Err(RetraceError::new(
                    call.index,
                    RetraceErrorKind::Capture,
                    err.to_string(),
                ))
            }
        }
    }
}
