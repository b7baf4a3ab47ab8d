//! CGL call table.
//!
//! CGL traces carry no separate drawable handle: the context handle names
//! both the context and the drawable it renders to. Every context shares
//! with the seed context.

use super::destroy_context;
use crate::dispatch::{CallTable, Family};
use crate::error::CallError;
use crate::handles::ShareWith;
use crate::session::Session;
use crate::thread_state::ThreadState;
use glreplay_core::Call;

const IGNORED: &[&str] = &[
    "CGLGetCurrentContext",
    "CGLEnable",
    "CGLDisable",
    "CGLIsEnabled",
    "CGLSetParameter",
    "CGLGetParameter",
    "CGLChoosePixelFormat",
    "CGLDestroyPixelFormat",
    "CGLDescribePixelFormat",
    "CGLGetPixelFormat",
    "CGLRetainContext",
    "CGLReleaseContext",
    "CGLSetSurface",
    "CGLGetSurface",
    "CGLLockContext",
    "CGLUnlockContext",
    // created lazily on first bind
    "CGLCreateContext",
];

/// CGL table
#[must_use]
pub fn table() -> CallTable {
    let table = CallTable::new(Family::Cgl)
        .handler("CGLSetCurrentContext", set_current_context)
        .handler("CGLFlushDrawable", flush_drawable)
        .handler("CGLDestroyContext", destroy);
    IGNORED.iter().fold(table, |t, name| t.ignore(name))
}

fn set_current_context(
    session: &Session,
    state: &mut ThreadState,
    call: &Call,
) -> Result<(), CallError> {
    let handle = call.arg_handle(0)?;
    let registry = session.registry();
    let context = registry.get_or_create_context_with(handle, ShareWith::Seed)?;
    let drawable = match context {
        Some(_) => registry.get_or_create_drawable(handle)?,
        None => None,
    };
    session.make_current(state, call, drawable, context);
    Ok(())
}

fn flush_drawable(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    call.arg_handle(0)?;
    session.frame_complete(state, call, None);
    Ok(())
}

fn destroy(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    destroy_context(session, state, call, 0)?;
    session.registry().destroy_drawable(call.arg_handle(0)?);
    Ok(())
}
