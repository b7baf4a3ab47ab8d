//! WGL call table.
//!
//! The device context (`hdc`) handle names the drawable.

use super::{create_context, destroy_context, make_current, swap};
use crate::dispatch::{CallTable, Family};

const IGNORED: &[&str] = &[
    "wglChoosePixelFormat",
    "wglChoosePixelFormatARB",
    "wglDescribePixelFormat",
    "wglGetPixelFormat",
    "wglSetPixelFormat",
    "wglGetPixelFormatAttribivARB",
    "wglGetProcAddress",
    "wglGetCurrentContext",
    "wglGetCurrentDC",
    "wglGetExtensionsStringARB",
    "wglGetExtensionsStringEXT",
    "wglSwapIntervalEXT",
    "wglGetSwapIntervalEXT",
    // sharing is set up when the context is created
    "wglShareLists",
];

/// WGL table
#[must_use]
pub fn table() -> CallTable {
    let table = CallTable::new(Family::Wgl)
        .handler("wglCreateContext", |s, _, c| create_context(s, c, None))
        .handler("wglCreateContextAttribsARB", |s, _, c| {
            create_context(s, c, Some(1))
        })
        .handler("wglMakeCurrent", |s, t, c| make_current(s, t, c, 0, 1))
        .handler("wglMakeContextCurrentARB", |s, t, c| {
            make_current(s, t, c, 0, 2)
        })
        .handler("wglSwapBuffers", |s, t, c| swap(s, t, c, 0))
        .handler("wglSwapLayerBuffers", |s, t, c| swap(s, t, c, 0))
        .handler("wglDeleteContext", |s, t, c| destroy_context(s, t, c, 0));
    IGNORED.iter().fold(table, |t, name| t.ignore(name))
}
