//! Built-in call tables, one module per API family.
//!
//! Windowing-system handlers differ mostly in where the display, drawable
//! and context sit in the argument list; the helpers here take those
//! positions.

pub mod cgl;
pub mod egl;
pub mod gl;
pub mod glx;
pub mod wgl;

use crate::error::CallError;
use crate::session::Session;
use crate::thread_state::ThreadState;
use glreplay_core::{Call, TraceHandle};

/// Create the context named by the return value, sharing with the
/// context at argument `share_arg` when given
pub(crate) fn create_context(
    session: &Session,
    call: &Call,
    share_arg: Option<usize>,
) -> Result<(), CallError> {
    let handle = call.ret_handle()?;
    let share = share_arg.map(|i| call.arg_handle(i)).transpose()?;
    session.registry().get_or_create_context(handle, share)?;
    Ok(())
}

/// Create the drawable named by the return value
pub(crate) fn create_drawable(session: &Session, call: &Call) -> Result<(), CallError> {
    session.registry().get_or_create_drawable(call.ret_handle()?)?;
    Ok(())
}

/// Bind the drawable and context found at the given argument positions
pub(crate) fn make_current(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    drawable_arg: usize,
    context_arg: usize,
) -> Result<(), CallError> {
    let drawable = call.arg_handle(drawable_arg)?;
    let context = call.arg_handle(context_arg)?;
    bind(session, state, call, drawable, context)
}

/// Resolve both handles and bind them; a null context unbinds without
/// creating the drawable
pub(crate) fn bind(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    drawable: TraceHandle,
    context: TraceHandle,
) -> Result<(), CallError> {
    let registry = session.registry();
    let context = registry.get_or_create_context(context, None)?;
    let drawable = match context {
        Some(_) => registry.get_or_create_drawable(drawable)?,
        None => None,
    };
    session.make_current(state, call, drawable, context);
    Ok(())
}

/// Complete a frame on the drawable at argument `drawable_arg`
pub(crate) fn swap(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    drawable_arg: usize,
) -> Result<(), CallError> {
    let handle = call.arg_handle(drawable_arg)?;
    let drawable = session.registry().drawable(handle);
    session.frame_complete(state, call, drawable);
    Ok(())
}

/// Destroy the context at argument `context_arg`, unbinding it first if
/// it is current on this thread
pub(crate) fn destroy_context(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    context_arg: usize,
) -> Result<(), CallError> {
    let handle = call.arg_handle(context_arg)?;
    unbind_if_current(session, state, call, handle);
    session.registry().destroy_context(handle);
    Ok(())
}

/// Destroy the drawable at argument `drawable_arg`
pub(crate) fn destroy_drawable(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    drawable_arg: usize,
) -> Result<(), CallError> {
    let handle = call.arg_handle(drawable_arg)?;
    if state
        .current_drawable()
        .is_some_and(|d| d.handle() == handle)
    {
        session.make_current(state, call, None, None);
    }
    session.registry().destroy_drawable(handle);
    Ok(())
}

/// Unbind the calling thread
pub(crate) fn release(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
) -> Result<(), CallError> {
    session.make_current(state, call, None, None);
    Ok(())
}

pub(crate) fn unbind_if_current(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
    context: TraceHandle,
) {
    if state
        .current_context()
        .is_some_and(|c| c.handle() == context)
    {
        session.make_current(state, call, None, None);
    }
}
