//! Core API call table.
//!
//! Most calls are issued to the backend unchanged. The handlers here
//! additionally track what the replay engine itself needs to know: the
//! installed program, begin/end and display-list nesting, and drawable size.

use crate::dispatch::{CallTable, Family};
use crate::error::CallError;
use crate::session::Session;
use crate::thread_state::ThreadState;
use glreplay_core::{Call, CoreError};

const PASS_THROUGH: &[&str] = &[
    "glClear",
    "glClearColor",
    "glClearDepth",
    "glClearDepthf",
    "glClearStencil",
    "glEnable",
    "glDisable",
    "glBlendFunc",
    "glBlendFuncSeparate",
    "glBlendEquation",
    "glDepthFunc",
    "glDepthMask",
    "glDepthRange",
    "glColorMask",
    "glStencilFunc",
    "glStencilOp",
    "glStencilMask",
    "glCullFace",
    "glFrontFace",
    "glPolygonMode",
    "glPolygonOffset",
    "glScissor",
    "glLineWidth",
    "glPointSize",
    "glHint",
    "glPixelStorei",
    "glReadPixels",
    "glReadBuffer",
    "glDrawBuffer",
    "glDrawBuffers",
    "glFlush",
    "glFinish",
    // textures
    "glGenTextures",
    "glDeleteTextures",
    "glBindTexture",
    "glActiveTexture",
    "glTexImage2D",
    "glTexImage3D",
    "glTexSubImage2D",
    "glTexParameteri",
    "glTexParameterf",
    "glTexParameteriv",
    "glGenerateMipmap",
    "glCompressedTexImage2D",
    // buffers and vertex state
    "glGenBuffers",
    "glDeleteBuffers",
    "glBindBuffer",
    "glBindBufferBase",
    "glBufferData",
    "glBufferSubData",
    "glMapBuffer",
    "glUnmapBuffer",
    "glGenVertexArrays",
    "glDeleteVertexArrays",
    "glBindVertexArray",
    "glVertexAttribPointer",
    "glVertexAttribDivisor",
    "glEnableVertexAttribArray",
    "glDisableVertexAttribArray",
    "glVertexPointer",
    "glColorPointer",
    "glNormalPointer",
    "glTexCoordPointer",
    "glEnableClientState",
    "glDisableClientState",
    // shaders and programs
    "glCreateShader",
    "glShaderSource",
    "glCompileShader",
    "glDeleteShader",
    "glCreateProgram",
    "glAttachShader",
    "glDetachShader",
    "glBindAttribLocation",
    "glLinkProgram",
    "glValidateProgram",
    "glDeleteProgram",
    "glUniform1i",
    "glUniform1f",
    "glUniform2f",
    "glUniform3f",
    "glUniform4f",
    "glUniform1iv",
    "glUniform4fv",
    "glUniformMatrix3fv",
    "glUniformMatrix4fv",
    // framebuffers
    "glGenFramebuffers",
    "glDeleteFramebuffers",
    "glBindFramebuffer",
    "glFramebufferTexture2D",
    "glFramebufferRenderbuffer",
    "glGenRenderbuffers",
    "glDeleteRenderbuffers",
    "glBindRenderbuffer",
    "glRenderbufferStorage",
    "glBlitFramebuffer",
    // fixed function
    "glMatrixMode",
    "glLoadIdentity",
    "glLoadMatrixf",
    "glMultMatrixf",
    "glOrtho",
    "glFrustum",
    "glPushMatrix",
    "glPopMatrix",
    "glPushAttrib",
    "glPopAttrib",
    "glTranslatef",
    "glRotatef",
    "glScalef",
    "glShadeModel",
    "glLightf",
    "glLightfv",
    "glMaterialf",
    "glMaterialfv",
    "glColor3f",
    "glColor4f",
    "glColor4ub",
    "glNormal3f",
    "glTexCoord2f",
    "glVertex2f",
    "glVertex3f",
    "glGenLists",
    "glDeleteLists",
];

const DRAW: &[&str] = &[
    "glDrawArrays",
    "glDrawElements",
    "glDrawRangeElements",
    "glDrawArraysInstanced",
    "glDrawElementsInstanced",
    "glDrawElementsBaseVertex",
    "glMultiDrawArrays",
    "glMultiDrawElements",
    "glCallList",
    "glCallLists",
];

const IGNORED: &[&str] = &[
    "glGetError",
    "glGetIntegerv",
    "glGetFloatv",
    "glGetBooleanv",
    "glGetDoublev",
    "glGetString",
    "glGetStringi",
    "glGetShaderiv",
    "glGetShaderInfoLog",
    "glGetProgramiv",
    "glGetProgramInfoLog",
    "glGetUniformLocation",
    "glGetAttribLocation",
    "glGetTexParameteriv",
    "glGetTexImage",
    "glIsEnabled",
    "glIsTexture",
    "glIsBuffer",
    "glIsProgram",
    "glCheckFramebufferStatus",
];

/// Core API table
#[must_use]
pub fn table() -> CallTable {
    let mut table = CallTable::new(Family::Gl)
        .handler("glUseProgram", use_program)
        .handler("glViewport", viewport)
        .handler("glBegin", begin)
        .draw("glEnd", end)
        .handler("glNewList", new_list)
        .handler("glEndList", end_list);
    for name in PASS_THROUGH {
        table = table.handler(name, pass_through);
    }
    for name in DRAW {
        table = table.draw(name, pass_through);
    }
    IGNORED.iter().fold(table, |t, name| t.ignore(name))
}

fn pass_through(session: &Session, _state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    session.issue(call);
    Ok(())
}

fn use_program(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    let program = call.arg_uint(0)?;
    let program = u32::try_from(program).map_err(|_| CoreError::Validation {
        field: format!("{}.program", call.name),
        reason: format!("{program} does not fit a program name"),
    })?;
    session.issue(call);
    if let Some(context) = state.current_context() {
        context.set_active_program(program);
    }
    Ok(())
}

fn viewport(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    let x = call.arg_int(0)?;
    let y = call.arg_int(1)?;
    let width = call.arg_int(2)?;
    let height = call.arg_int(3)?;
    session.issue(call);

    let Some(drawable) = state.current_drawable() else {
        return Ok(());
    };
    let extent = |origin: i64, len: i64| u32::try_from(origin.saturating_add(len).max(0)).unwrap_or(u32::MAX);
    if let Some((w, h)) = drawable.grow_to(extent(x, width), extent(y, height)) {
        tracing::debug!(call = call.index, drawable = %drawable.id(), width = w, height = h, "drawable resized");
        session.backend().resize_drawable(drawable.native(), w, h);
    }
    Ok(())
}

fn begin(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    session.issue(call);
    state.inside_begin_end = true;
    Ok(())
}

fn end(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    session.issue(call);
    state.inside_begin_end = false;
    Ok(())
}

fn new_list(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    session.issue(call);
    state.inside_list = true;
    Ok(())
}

fn end_list(session: &Session, state: &mut ThreadState, call: &Call) -> Result<(), CallError> {
    session.issue(call);
    state.inside_list = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::testing::{h, Harness};
    use crate::backend::{BackendOp, HeadlessBackend};
    use crate::config::ReplayConfig;
    use crate::error::RetraceErrorKind;
    use glreplay_core::Value;

    fn bound() -> Harness {
        let mut hx = Harness::new();
        hx.call("CGLSetCurrentContext", vec![h(1)]);
        hx
    }

    #[test]
    fn test_pass_through_under_current_context() {
        let mut hx = bound();
        let call = hx.call("glClear", vec![Value::UInt(0x4000)]);
        let context = hx.state.current_context().unwrap().native();
        assert!(hx.backend.ops().contains(&BackendOp::Execute {
            call_index: call.index,
            name: "glClear".to_string(),
            context: Some(context),
        }));
    }

    #[test]
    fn test_use_program_updates_context() {
        let mut hx = bound();
        hx.call("glUseProgram", vec![Value::UInt(3)]);
        assert_eq!(hx.state.current_context().unwrap().active_program(), 3);
    }

    #[test]
    fn test_use_program_rejects_bad_argument() {
        let mut hx = bound();
        hx.call("glUseProgram", vec![Value::String("three".to_string())]);
        let errors = hx.session.instrumentation().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, RetraceErrorKind::Malformed);
        assert_eq!(hx.state.current_context().unwrap().active_program(), 0);
    }

    #[test]
    fn test_viewport_grows_drawable() {
        let mut hx = bound();
        hx.call(
            "glViewport",
            vec![Value::Int(0), Value::Int(0), Value::Int(800), Value::Int(600)],
        );
        let drawable = hx.state.current_drawable().unwrap();
        assert_eq!(drawable.size(), (800, 600));
        assert!(hx.backend.ops().contains(&BackendOp::Resize {
            drawable: drawable.native(),
            width: 800,
            height: 600,
        }));

        hx.call(
            "glViewport",
            vec![Value::Int(0), Value::Int(0), Value::Int(100), Value::Int(100)],
        );
        assert_eq!(hx.state.current_drawable().unwrap().size(), (800, 600));
    }

    #[test]
    fn test_no_error_check_inside_begin_end() {
        let backend = HeadlessBackend::new().with_error_on("glVertex3f", 0x0502);
        let mut hx = Harness::with_backend(backend, ReplayConfig::default());
        hx.call("CGLSetCurrentContext", vec![h(1)]);
        hx.call("glBegin", vec![Value::UInt(4)]);
        hx.call("glVertex3f", vec![Value::Float(0.0), Value::Float(0.0), Value::Float(0.0)]);
        assert!(hx.session.instrumentation().errors().is_empty());
        hx.call("glEnd", vec![]);
        // the error raised inside the pair surfaces after glEnd
        let errors = hx.session.instrumentation().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].call_index, 3);
        assert!(!hx.state.inside_begin_end);
    }

    #[test]
    fn test_draws_inside_list_not_profiled_as_draw() {
        let mut hx = Harness::with_config(ReplayConfig::default().with_profiling(true));
        hx.call("CGLSetCurrentContext", vec![h(1)]);
        hx.call("glNewList", vec![Value::UInt(1), Value::UInt(0x1300)]);
        hx.call("glDrawArrays", vec![Value::UInt(4), Value::Int(0), Value::Int(3)]);
        hx.call("glEndList", vec![]);
        hx.call("glDrawArrays", vec![Value::UInt(4), Value::Int(0), Value::Int(3)]);

        let draws: Vec<_> = hx
            .session
            .instrumentation()
            .profile()
            .into_iter()
            .filter(|p| p.name == "glDrawArrays")
            .map(|p| p.is_draw)
            .collect();
        assert_eq!(draws, vec![false, true]);
    }

    #[test]
    fn test_queries_are_registered_no_ops() {
        let mut hx = bound();
        let before = hx.backend.ops().len();
        hx.call("glGetError", vec![]);
        hx.call("glGetIntegerv", vec![Value::UInt(0x0BA2), Value::Null]);
        assert_eq!(hx.backend.ops().len(), before);
        assert_eq!(hx.session.instrumentation().unsupported().count, 0);
    }

    #[test]
    fn test_flush_is_not_a_frame() {
        let mut hx = bound();
        hx.call("glFlush", vec![]);
        hx.call("glFinish", vec![]);
        assert_eq!(hx.session.instrumentation().frames(), 0);
    }
}
