//! Replay driver.
//!
//! Pulls calls from a `CallStream` strictly in order and dispatches each
//! one, either on the driving thread or on one worker per captured thread.
//! In the threaded mode the driver still waits for every call to finish
//! before pulling the next, so stream order is the only order.

use crate::backend::Backend;
use crate::config::{ReplayConfig, ThreadMode};
use crate::dispatch::DispatchRegistry;
use crate::error::{RetraceError, RetraceErrorKind};
use crate::instrument::FrameCounter;
use crate::session::Session;
use crate::snapshot::{BackendStateCapture, StateCapture, StateSnapshot};
use crate::state::{RunResult, RunStatus};
use crate::thread_state::ThreadState;
use crate::trace::CallStream;
use glreplay_core::{Call, RunId, ThreadId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::Scope;

/// Cooperative stop signal, checked between calls
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Create a handle with no stop requested
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running replay to stop after the current call
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear a pending request
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of dispatching one call
struct Step {
    snapshot: Option<Result<StateSnapshot, RetraceError>>,
}

/// Where the driver loop ended
struct Progress {
    status: RunStatus,
    calls_replayed: u64,
    snapshot: Option<StateSnapshot>,
}

/// Replay engine
pub struct ReplayEngine {
    backend: Arc<dyn Backend>,
    dispatch: Arc<DispatchRegistry>,
    capture: Arc<dyn StateCapture>,
    stop: StopHandle,
    frames: FrameCounter,
}

impl ReplayEngine {
    /// Create an engine with the standard call tables
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            dispatch: Arc::new(DispatchRegistry::standard()),
            capture: Arc::new(BackendStateCapture),
            stop: StopHandle::new(),
            frames: FrameCounter::new(),
        }
    }

    /// Replace the call tables
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchRegistry) -> Self {
        self.dispatch = Arc::new(dispatch);
        self
    }

    /// Replace the state-capture collaborator
    #[must_use]
    pub fn with_state_capture(mut self, capture: impl StateCapture + 'static) -> Self {
        self.capture = Arc::new(capture);
        self
    }

    /// Stop signal for this engine's runs
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Frame counter for progress reporting
    #[must_use]
    pub fn frame_counter(&self) -> FrameCounter {
        self.frames.clone()
    }

    /// Replay `stream` to the end, a stop request, the snapshot or a fatal
    /// error, whichever comes first.
    ///
    /// Every context and drawable the run created is destroyed before this
    /// returns. A stop request is consumed by the run it stopped.
    pub fn run(&self, stream: &mut dyn CallStream, config: &ReplayConfig) -> RunResult {
        let run_id = RunId::new();
        self.frames.reset();
        let session = Session::new(
            run_id,
            config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.dispatch),
            Arc::clone(&self.capture),
            self.frames.clone(),
        );

        let span = tracing::info_span!("replay", run_id = %run_id, backend = self.backend.name());
        let _guard = span.enter();
        tracing::info!(
            thread_mode = ?config.thread_mode,
            double_buffered = config.double_buffered,
            benchmarking = config.benchmarking,
            capture_at = ?config.capture_at_call.filter(|_| config.capture_state),
            "replay started"
        );

        let progress = match config.thread_mode {
            ThreadMode::Single => self.run_single(&session, stream, config),
            ThreadMode::PerCaptureThread => self.run_threaded(&session, stream, config),
        };

        let instrumentation = session.instrumentation();
        instrumentation.flush_queries(session.backend());
        session.registry().teardown();
        self.stop.reset();

        let mut errors = instrumentation.errors();
        if let RunStatus::Aborted(err) = &progress.status {
            errors.push(err.clone());
        }
        let result = RunResult {
            run_id,
            status: progress.status,
            frames_completed: instrumentation.frames(),
            calls_replayed: progress.calls_replayed,
            errors,
            unsupported: instrumentation.unsupported(),
            snapshot: progress.snapshot,
            profile: instrumentation.profile(),
        };

        match &result.status {
            RunStatus::Aborted(err) => tracing::error!(error = %err, "replay aborted"),
            status => tracing::info!(
                status = ?status,
                calls = result.calls_replayed,
                frames = result.frames_completed,
                errors = result.errors.len(),
                unsupported = result.unsupported.count,
                "replay finished"
            ),
        }
        result
    }

    fn run_single(
        &self,
        session: &Session,
        stream: &mut dyn CallStream,
        config: &ReplayConfig,
    ) -> Progress {
        let mut state: Option<ThreadState> = None;
        let progress = self.drive(session, stream, config, |call, capture| {
            let state = state.get_or_insert_with(|| ThreadState::new(call.thread));
            step(session, state, &call, capture)
        });
        if let Some(mut state) = state {
            release(session, &mut state);
        }
        progress
    }

    fn run_threaded(
        &self,
        session: &Session,
        stream: &mut dyn CallStream,
        config: &ReplayConfig,
    ) -> Progress {
        std::thread::scope(|scope| {
            let mut workers: HashMap<ThreadId, Worker> = HashMap::new();
            let progress = self.drive(session, stream, config, |call, capture| {
                let worker = match workers.entry(call.thread) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => {
                        let worker = Worker::spawn(scope, session, call.thread).map_err(|e| {
                            RetraceError::new(call.index, RetraceErrorKind::Worker, e.to_string())
                        })?;
                        entry.insert(worker)
                    }
                };
                worker.run(call, capture)
            });
            // closing the job channels lets every worker unbind and exit
            drop(workers);
            progress
        })
    }

    fn drive(
        &self,
        session: &Session,
        stream: &mut dyn CallStream,
        config: &ReplayConfig,
        mut exec: impl FnMut(Call, bool) -> Result<Step, RetraceError>,
    ) -> Progress {
        let mut calls_replayed = 0u64;
        let mut next_index = 0u64;
        let mut captured = false;
        let mut snapshot = None;

        let status = loop {
            if self.stop.is_stop_requested() {
                tracing::info!(next_call = next_index, "stop requested");
                break RunStatus::Stopped;
            }
            if config.max_calls > 0 && calls_replayed >= config.max_calls {
                break RunStatus::CallLimit;
            }
            let call = match stream.next_call() {
                Ok(Some(call)) => call,
                Ok(None) => break RunStatus::Completed,
                Err(err) => {
                    break RunStatus::Aborted(RetraceError::new(
                        next_index,
                        RetraceErrorKind::Stream,
                        err.to_string(),
                    ));
                }
            };

            next_index = call.index.saturating_add(1);
            let capture = !captured && config.capture_due(call.index);
            calls_replayed += 1;

            let step = match exec(call, capture) {
                Ok(step) => step,
                Err(fatal) => break RunStatus::Aborted(fatal),
            };
            if let Some(result) = step.snapshot {
                captured = true;
                match result {
                    Ok(taken) => snapshot = Some(taken),
                    Err(err) => session.instrumentation().record_error(err),
                }
                if config.stop_after_capture {
                    break RunStatus::CaptureReached;
                }
            }
        };

        Progress {
            status,
            calls_replayed,
            snapshot,
        }
    }
}

/// Dispatch one call on `state`'s thread, then capture if asked
fn step(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    capture: bool,
) -> Result<Step, RetraceError> {
    session.execute(state, call)?;
    let snapshot = capture.then(|| session.capture(state, call));
    Ok(Step { snapshot })
}

/// Unbind whatever a finished replay thread still holds
fn release(session: &Session, state: &mut ThreadState) {
    if !state.is_bound() {
        return;
    }
    if let Err(err) = state.make_current(session.backend(), None, None) {
        tracing::warn!(thread = %state.thread(), error = %err, "final unbind failed");
    }
}

struct Job {
    call: Call,
    capture: bool,
}

/// Replay thread standing in for one captured thread
struct Worker {
    jobs: mpsc::Sender<Job>,
    done: mpsc::Receiver<Result<Step, RetraceError>>,
}

impl Worker {
    fn spawn<'scope>(
        scope: &'scope Scope<'scope, '_>,
        session: &'scope Session,
        thread: ThreadId,
    ) -> std::io::Result<Self> {
        let (jobs, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done) = mpsc::channel();
        let span = tracing::debug_span!("worker", thread = %thread);

        std::thread::Builder::new()
            .name(format!("replay-{thread}"))
            .spawn_scoped(scope, move || {
                let _entered = span.enter();
                tracing::debug!("worker started");
                let mut state = ThreadState::new(thread);
                for job in job_rx {
                    let result = step(session, &mut state, &job.call, job.capture);
                    if done_tx.send(result).is_err() {
                        break;
                    }
                }
                release(session, &mut state);
                tracing::debug!("worker stopped");
            })?;

        Ok(Self { jobs, done })
    }

    fn run(&self, call: Call, capture: bool) -> Result<Step, RetraceError> {
        let index = call.index;
        let lost = || RetraceError::new(index, RetraceErrorKind::Worker, "replay worker exited");
        self.jobs.send(Job { call, capture }).map_err(|_| lost())?;
        self.done.recv().map_err(|_| lost())?
    }
}
