//! Call dispatch tables.
//!
//! A `CallTable` maps exact call names to handlers for one API family.
//! The `DispatchRegistry` holds the core table plus the windowing-system
//! tables and is immutable once a session starts.

use crate::error::{CallError, DispatchError};
use crate::families;
use crate::session::Session;
use crate::thread_state::ThreadState;
use glreplay_core::Call;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API family a call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Core rendering API
    Gl,
    /// macOS windowing system
    Cgl,
    /// X11 windowing system
    Glx,
    /// Windows windowing system
    Wgl,
    /// Khronos native platform interface
    Egl,
}

impl Family {
    /// Every windowing-system family
    pub const WINDOWING: [Family; 4] = [Self::Cgl, Self::Glx, Self::Wgl, Self::Egl];

    /// Whether this is a windowing-system family
    #[must_use]
    pub fn is_windowing(&self) -> bool {
        !matches!(self, Self::Gl)
    }

    /// Windowing-system family of a call name, `None` for core calls
    #[must_use]
    pub fn detect(name: &str) -> Option<Family> {
        if name.starts_with("CGL") {
            Some(Self::Cgl)
        } else if name.starts_with("glX") {
            Some(Self::Glx)
        } else if name.starts_with("wgl") {
            Some(Self::Wgl)
        } else if name.starts_with("egl") {
            Some(Self::Egl)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Gl => "GL",
            Self::Cgl => "CGL",
            Self::Glx => "GLX",
            Self::Wgl => "WGL",
            Self::Egl => "EGL",
        };
        f.write_str(name)
    }
}

/// Call handler
pub type Handler =
    Arc<dyn Fn(&Session, &mut ThreadState, &Call) -> Result<(), CallError> + Send + Sync>;

/// What happens when a call resolves
#[derive(Clone)]
pub enum EntryKind {
    /// Run the handler
    Handler(Handler),
    /// Registered as intentionally ignored
    Ignore,
}

impl std::fmt::Debug for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler"),
            Self::Ignore => f.write_str("Ignore"),
        }
    }
}

/// Table entry for one call name
#[derive(Debug, Clone)]
pub struct Entry {
    /// Handler or no-op
    pub kind: EntryKind,
    /// Profiled as a draw
    pub draw: bool,
}

impl Entry {
    /// Whether the call is a registered no-op
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        matches!(self.kind, EntryKind::Ignore)
    }
}

/// Name-to-handler table for one family
#[derive(Debug, Clone)]
pub struct CallTable {
    family: Family,
    entries: IndexMap<String, Entry>,
}

impl CallTable {
    /// Create an empty table
    #[must_use]
    pub fn new(family: Family) -> Self {
        Self {
            family,
            entries: IndexMap::new(),
        }
    }

    /// Family served by this table
    #[must_use]
    pub fn family(&self) -> Family {
        self.family
    }

    /// Register a handler
    #[must_use]
    pub fn handler<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Session, &mut ThreadState, &Call) -> Result<(), CallError> + Send + Sync + 'static,
    {
        self.insert(name, EntryKind::Handler(Arc::new(handler)), false);
        self
    }

    /// Register a handler for a draw-class call
    #[must_use]
    pub fn draw<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&Session, &mut ThreadState, &Call) -> Result<(), CallError> + Send + Sync + 'static,
    {
        self.insert(name, EntryKind::Handler(Arc::new(handler)), true);
        self
    }

    /// Register an intentionally ignored call
    #[must_use]
    pub fn ignore(mut self, name: &str) -> Self {
        self.insert(name, EntryKind::Ignore, false);
        self
    }

    /// Register or replace an entry
    pub fn insert(&mut self, name: &str, kind: EntryKind, draw: bool) {
        self.entries.insert(name.to_string(), Entry { kind, draw });
    }

    /// Look up a call name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Registered names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered names
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Core table plus windowing-system tables
#[derive(Debug, Clone)]
pub struct DispatchRegistry {
    core: CallTable,
    windowing: IndexMap<Family, CallTable>,
}

impl DispatchRegistry {
    /// Create a registry with empty tables
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: CallTable::new(Family::Gl),
            windowing: IndexMap::new(),
        }
    }

    /// Registry with the built-in core and windowing-system tables
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new().with_table(families::gl::table());
        for table in [
            families::cgl::table(),
            families::glx::table(),
            families::wgl::table(),
            families::egl::table(),
        ] {
            registry = registry.with_table(table);
        }
        registry
    }

    /// Add or replace the table for its family
    #[must_use]
    pub fn with_table(mut self, table: CallTable) -> Self {
        if table.family().is_windowing() {
            self.windowing.insert(table.family(), table);
        } else {
            self.core = table;
        }
        self
    }

    /// Table for a family, created empty if missing
    pub fn table_mut(&mut self, family: Family) -> &mut CallTable {
        if family.is_windowing() {
            self.windowing
                .entry(family)
                .or_insert_with(|| CallTable::new(family))
        } else {
            &mut self.core
        }
    }

    /// Table for a family
    #[must_use]
    pub fn table(&self, family: Family) -> Option<&CallTable> {
        if family.is_windowing() {
            self.windowing.get(&family)
        } else {
            Some(&self.core)
        }
    }

    /// Registered families, core first
    #[must_use]
    pub fn families(&self) -> Vec<Family> {
        std::iter::once(Family::Gl)
            .chain(self.windowing.keys().copied())
            .collect()
    }

    /// Resolve a call name within one family
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the family has no entry for `name`
    pub fn resolve(&self, family: Family, name: &str) -> Result<&Entry, DispatchError> {
        self.table(family)
            .and_then(|table| table.get(name))
            .ok_or_else(|| DispatchError::NotFound {
                name: name.to_string(),
            })
    }
}

impl Default for DispatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_detect() {
        assert_eq!(Family::detect("CGLSetCurrentContext"), Some(Family::Cgl));
        assert_eq!(Family::detect("glXMakeCurrent"), Some(Family::Glx));
        assert_eq!(Family::detect("wglMakeCurrent"), Some(Family::Wgl));
        assert_eq!(Family::detect("eglMakeCurrent"), Some(Family::Egl));
        assert_eq!(Family::detect("glClear"), None);
        assert_eq!(Family::detect("glxMakeCurrent"), None);
    }

    #[test]
    fn test_family_display_and_serde() {
        assert_eq!(Family::Wgl.to_string(), "WGL");
        assert_eq!(serde_json::to_string(&Family::Egl).unwrap(), "\"egl\"");
        assert!(!Family::Gl.is_windowing());
        assert!(Family::WINDOWING.iter().all(Family::is_windowing));
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let registry = DispatchRegistry::standard();
        assert!(registry.resolve(Family::Gl, "glClear").is_ok());
        assert!(matches!(
            registry.resolve(Family::Gl, "glclear"),
            Err(DispatchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_standard_registers_every_family() {
        let registry = DispatchRegistry::standard();
        assert_eq!(
            registry.families(),
            vec![Family::Gl, Family::Cgl, Family::Glx, Family::Wgl, Family::Egl]
        );
        for family in registry.families() {
            assert!(!registry.table(family).unwrap().is_empty());
        }
    }

    #[test]
    fn test_ignored_and_draw_entries() {
        let registry = DispatchRegistry::standard();
        assert!(registry.resolve(Family::Gl, "glGetError").unwrap().is_ignored());
        assert!(registry.resolve(Family::Gl, "glDrawArrays").unwrap().draw);
        assert!(!registry.resolve(Family::Gl, "glClear").unwrap().draw);
    }

    #[test]
    fn test_windowing_lookup_does_not_cross_families() {
        let registry = DispatchRegistry::standard();
        assert!(registry.resolve(Family::Glx, "glXMakeCurrent").is_ok());
        assert!(registry.resolve(Family::Wgl, "glXMakeCurrent").is_err());
        assert!(registry.resolve(Family::Gl, "glXMakeCurrent").is_err());
    }

    #[test]
    fn test_mock_handler_registration() {
        let mut registry =
            DispatchRegistry::new().with_table(CallTable::new(Family::Gl).draw("glMock", |_, _, _| Ok(())));
        let entry = registry.resolve(Family::Gl, "glMock").unwrap();
        assert!(entry.draw);
        assert!(!entry.is_ignored());
        assert!(registry.table(Family::Cgl).is_none());

        registry.table_mut(Family::Cgl).insert("CGLMock", EntryKind::Ignore, false);
        assert!(registry.resolve(Family::Cgl, "CGLMock").unwrap().is_ignored());
    }
}
