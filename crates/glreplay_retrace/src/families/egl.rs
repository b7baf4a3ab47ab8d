//! EGL call table.

use super::{
    create_context, create_drawable, destroy_context, destroy_drawable, make_current, release,
    swap,
};
use crate::dispatch::{CallTable, Family};

const IGNORED: &[&str] = &[
    "eglGetDisplay",
    "eglGetPlatformDisplay",
    "eglGetPlatformDisplayEXT",
    "eglInitialize",
    "eglTerminate",
    "eglChooseConfig",
    "eglGetConfigs",
    "eglGetConfigAttrib",
    "eglBindAPI",
    "eglQueryAPI",
    "eglQueryString",
    "eglQueryContext",
    "eglQuerySurface",
    "eglSurfaceAttrib",
    "eglGetCurrentContext",
    "eglGetCurrentSurface",
    "eglGetCurrentDisplay",
    "eglGetProcAddress",
    "eglGetError",
    "eglSwapInterval",
    "eglWaitClient",
    "eglWaitGL",
    "eglWaitNative",
];

/// EGL table
#[must_use]
pub fn table() -> CallTable {
    let table = CallTable::new(Family::Egl)
        .handler("eglCreateContext", |s, _, c| create_context(s, c, Some(2)))
        .handler("eglCreateWindowSurface", |s, _, c| create_drawable(s, c))
        .handler("eglCreatePlatformWindowSurface", |s, _, c| {
            create_drawable(s, c)
        })
        .handler("eglCreatePbufferSurface", |s, _, c| create_drawable(s, c))
        .handler("eglMakeCurrent", |s, t, c| make_current(s, t, c, 1, 3))
        .handler("eglSwapBuffers", |s, t, c| swap(s, t, c, 1))
        .handler("eglDestroyContext", |s, t, c| destroy_context(s, t, c, 1))
        .handler("eglDestroySurface", |s, t, c| destroy_drawable(s, t, c, 1))
        .handler("eglReleaseThread", release);
    IGNORED.iter().fold(table, |t, name| t.ignore(name))
}
