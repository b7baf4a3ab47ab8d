//! Per-thread current-context state.
//!
//! Each replay thread owns exactly one `ThreadState`; it is created by the
//! thread that uses it and never handed to another thread.

use crate::backend::{Backend, NativeBinding};
use crate::error::BackendError;
use crate::handles::{Context, Drawable};
use glreplay_core::ThreadId;
use std::sync::Arc;

/// Context and drawable bound together on a thread
#[derive(Debug, Clone)]
pub struct Binding {
    /// Bound context
    pub context: Arc<Context>,
    /// Bound drawable
    pub drawable: Arc<Drawable>,
}

impl Binding {
    fn same_as(&self, context: &Arc<Context>, drawable: &Arc<Drawable>) -> bool {
        Arc::ptr_eq(&self.context, context) && Arc::ptr_eq(&self.drawable, drawable)
    }
}

/// Outcome of a make-current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Unbound or differently bound before, bound now
    Bound,
    /// The same pair was already current; the native bind was still issued
    Rebound,
    /// Nothing bound now
    Unbound,
}

/// Current-state of one replay thread
#[derive(Debug)]
pub struct ThreadState {
    thread: ThreadId,
    binding: Option<Binding>,
    /// Between `glBegin` and `glEnd`
    pub inside_begin_end: bool,
    /// Between `glNewList` and `glEndList`
    pub inside_list: bool,
}

impl ThreadState {
    /// Create the unbound state for a thread
    #[must_use]
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            binding: None,
            inside_begin_end: false,
            inside_list: false,
        }
    }

    /// Captured thread this state replays
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Current binding
    #[must_use]
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Whether a context is bound
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Current context
    #[must_use]
    pub fn current_context(&self) -> Option<&Arc<Context>> {
        self.binding.as_ref().map(|b| &b.context)
    }

    /// Current drawable
    #[must_use]
    pub fn current_drawable(&self) -> Option<&Arc<Drawable>> {
        self.binding.as_ref().map(|b| &b.drawable)
    }

    /// Bind `drawable` and `context`, or unbind when either is `None`.
    ///
    /// The native call is always issued, including for the pair that is
    /// already current. If the native bind fails the state is unchanged.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects the bind
    pub fn make_current(
        &mut self,
        backend: &dyn Backend,
        drawable: Option<Arc<Drawable>>,
        context: Option<Arc<Context>>,
    ) -> Result<Transition, BackendError> {
        match (drawable, context) {
            (Some(drawable), Some(context)) => {
                backend.make_current(Some(NativeBinding {
                    drawable: drawable.native(),
                    context: context.native(),
                }))?;
                context.mark_used();
                let rebound = self
                    .binding
                    .as_ref()
                    .is_some_and(|b| b.same_as(&context, &drawable));
                self.binding = Some(Binding { context, drawable });
                Ok(if rebound {
                    Transition::Rebound
                } else {
                    Transition::Bound
                })
            }
            _ => {
                backend.make_current(None)?;
                self.binding = None;
                self.inside_begin_end = false;
                Ok(Transition::Unbound)
            }
        }
    }
}
