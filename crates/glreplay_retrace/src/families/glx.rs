//! GLX call table.

use super::{create_context, destroy_context, destroy_drawable, make_current, swap};
use crate::dispatch::{CallTable, Family};

const IGNORED: &[&str] = &[
    "glXChooseVisual",
    "glXChooseFBConfig",
    "glXGetFBConfigs",
    "glXGetFBConfigAttrib",
    "glXGetVisualFromFBConfig",
    "glXGetConfig",
    "glXQueryExtension",
    "glXQueryExtensionsString",
    "glXQueryVersion",
    "glXQueryDrawable",
    "glXQueryContext",
    "glXIsDirect",
    "glXGetCurrentContext",
    "glXGetCurrentDisplay",
    "glXGetCurrentDrawable",
    "glXGetProcAddress",
    "glXGetProcAddressARB",
    "glXSwapIntervalEXT",
    "glXSwapIntervalMESA",
    "glXSwapIntervalSGI",
    "glXWaitGL",
    "glXWaitX",
    "glXCreateWindow",
    "glXCreatePixmap",
    "glXCreatePbuffer",
];

/// GLX table
#[must_use]
pub fn table() -> CallTable {
    let table = CallTable::new(Family::Glx)
        .handler("glXCreateContext", |s, _, c| create_context(s, c, Some(2)))
        .handler("glXCreateNewContext", |s, _, c| create_context(s, c, Some(3)))
        .handler("glXCreateContextAttribsARB", |s, _, c| {
            create_context(s, c, Some(2))
        })
        .handler("glXMakeCurrent", |s, t, c| make_current(s, t, c, 1, 2))
        .handler("glXMakeContextCurrent", |s, t, c| make_current(s, t, c, 1, 3))
        .handler("glXSwapBuffers", |s, t, c| swap(s, t, c, 1))
        .handler("glXDestroyContext", |s, t, c| destroy_context(s, t, c, 1))
        .handler("glXDestroyWindow", |s, t, c| destroy_drawable(s, t, c, 1))
        .handler("glXDestroyPixmap", |s, t, c| destroy_drawable(s, t, c, 1))
        .handler("glXDestroyPbuffer", |s, t, c| destroy_drawable(s, t, c, 1));
    IGNORED.iter().fold(table, |t, name| t.ignore(name))
}
