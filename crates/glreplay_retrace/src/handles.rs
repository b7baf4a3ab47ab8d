//! Handle virtualization.
//!
//! Maps handles recorded at capture time to live contexts and drawables.
//! Every lookup-or-create and destroy runs under one lock, so a handle is
//! never created twice even when several replay threads race on it.
//! Once created, a handle resolves to the same `Arc` until it is destroyed.

use crate::backend::{Backend, DrawableDesc, NativeHandle};
use crate::error::BackendError;
use glreplay_core::{ContextId, DrawableId, GroupId, TraceHandle};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

/// Size of a drawable before the stream resizes it
pub const DEFAULT_DRAWABLE_SIZE: (u32, u32) = (256, 256);

/// Live context created for a trace handle
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    handle: TraceHandle,
    native: NativeHandle,
    active_program: AtomicU32,
    used: AtomicBool,
    group: OnceLock<GroupId>,
}

impl Context {
    /// Replay-side id
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Trace handle this context was created for
    #[must_use]
    pub fn handle(&self) -> TraceHandle {
        self.handle
    }

    /// Native handle owned by the backend
    #[must_use]
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    /// Program last installed with `glUseProgram`
    #[must_use]
    pub fn active_program(&self) -> u32 {
        self.active_program.load(Ordering::Acquire)
    }

    /// Record the installed program
    pub fn set_active_program(&self, program: u32) {
        self.active_program.store(program, Ordering::Release);
    }

    /// Whether the context has ever been bound
    #[must_use]
    pub fn is_used(&self) -> bool {
        self.used.load(Ordering::Acquire)
    }

    pub(crate) fn mark_used(&self) {
        self.used.store(true, Ordering::Release);
    }

    /// Shared group, if the context shares object namespaces
    #[must_use]
    pub fn shared_group(&self) -> Option<GroupId> {
        self.group.get().copied()
    }
}

/// Live drawable created for a trace handle
#[derive(Debug)]
pub struct Drawable {
    id: DrawableId,
    handle: TraceHandle,
    native: NativeHandle,
    width: AtomicU32,
    height: AtomicU32,
    double_buffered: bool,
}

impl Drawable {
    /// Replay-side id
    #[must_use]
    pub fn id(&self) -> DrawableId {
        self.id
    }

    /// Trace handle this drawable was created for
    #[must_use]
    pub fn handle(&self) -> TraceHandle {
        self.handle
    }

    /// Native handle owned by the backend
    #[must_use]
    pub fn native(&self) -> NativeHandle {
        self.native
    }

    /// Current `(width, height)`
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (
            self.width.load(Ordering::Acquire),
            self.height.load(Ordering::Acquire),
        )
    }

    /// Whether the drawable has a back buffer
    #[must_use]
    pub fn is_double_buffered(&self) -> bool {
        self.double_buffered
    }

    /// Grow to at least `(width, height)`; returns the new size if it changed
    pub(crate) fn grow_to(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        let (w, h) = self.size();
        if width <= w && height <= h {
            return None;
        }
        let size = (w.max(width), h.max(height));
        self.width.store(size.0, Ordering::Release);
        self.height.store(size.1, Ordering::Release);
        Some(size)
    }
}

/// How a new context picks the context it shares with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareWith {
    /// No sharing
    None,
    /// Share with the context registered for this handle, if any
    Handle(TraceHandle),
    /// Share with the seed: the first context created, or the oldest
    /// surviving member of its group once it is destroyed
    Seed,
}

#[derive(Debug, Default)]
struct GroupMembers {
    live: usize,
    retired: Vec<NativeHandle>,
}

#[derive(Default)]
struct Inner {
    contexts: IndexMap<TraceHandle, Arc<Context>>,
    drawables: IndexMap<TraceHandle, Arc<Drawable>>,
    groups: HashMap<GroupId, GroupMembers>,
    seed: Option<Arc<Context>>,
    next_context: u64,
    next_drawable: u64,
    next_group: u64,
}

/// Registry of virtualized handles for one replay session
pub struct HandleRegistry {
    backend: Arc<dyn Backend>,
    double_buffered: bool,
    inner: Mutex<Inner>,
}

impl HandleRegistry {
    /// Create an empty registry creating objects through `backend`
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, double_buffered: bool) -> Self {
        Self {
            backend,
            double_buffered,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve a context handle, creating the context on first sight.
    ///
    /// Null handles resolve to `None` without creating anything.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot create the native context
    pub fn get_or_create_context(
        &self,
        handle: TraceHandle,
        share: Option<TraceHandle>,
    ) -> Result<Option<Arc<Context>>, BackendError> {
        let share = match share {
            Some(h) if !h.is_null() => ShareWith::Handle(h),
            _ => ShareWith::None,
        };
        self.get_or_create_context_with(handle, share)
    }

    /// Resolve a context handle with an explicit sharing policy
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot create the native context
    pub fn get_or_create_context_with(
        &self,
        handle: TraceHandle,
        share: ShareWith,
    ) -> Result<Option<Arc<Context>>, BackendError> {
        if handle.is_null() {
            return Ok(None);
        }

        let mut inner = self.lock();
        if let Some(existing) = inner.contexts.get(&handle) {
            return Ok(Some(Arc::clone(existing)));
        }

        let share_ctx = match share {
            ShareWith::None => None,
            ShareWith::Handle(h) => inner.contexts.get(&h).cloned(),
            ShareWith::Seed => inner.seed.clone(),
        };

        let native = self
            .backend
            .create_context(share_ctx.as_ref().map(|c| c.native))?;

        inner.next_context += 1;
        let context = Arc::new(Context {
            id: ContextId::from_raw(inner.next_context),
            handle,
            native,
            active_program: AtomicU32::new(0),
            used: AtomicBool::new(false),
            group: OnceLock::new(),
        });

        if let Some(share_ctx) = share_ctx {
            let group = match share_ctx.shared_group() {
                Some(group) => group,
                None => {
                    inner.next_group += 1;
                    let group = GroupId::from_raw(inner.next_group);
                    let _ = share_ctx.group.set(group);
                    inner.groups.insert(
                        group,
                        GroupMembers {
                            live: 1,
                            retired: Vec::new(),
                        },
                    );
                    group
                }
            };
            let _ = context.group.set(group);
            inner.groups.entry(group).or_default().live += 1;
        }

        if inner.seed.is_none() {
            inner.seed = Some(Arc::clone(&context));
        }

        tracing::debug!(
            handle = %handle,
            context = %context.id,
            native = %native,
            group = ?context.shared_group(),
            "created context"
        );
        inner.contexts.insert(handle, Arc::clone(&context));
        Ok(Some(context))
    }

    /// Resolve a drawable handle, creating the drawable on first sight.
    ///
    /// Null handles resolve to `None` without creating anything.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot create the native drawable
    pub fn get_or_create_drawable(
        &self,
        handle: TraceHandle,
    ) -> Result<Option<Arc<Drawable>>, BackendError> {
        if handle.is_null() {
            return Ok(None);
        }

        let mut inner = self.lock();
        if let Some(existing) = inner.drawables.get(&handle) {
            return Ok(Some(Arc::clone(existing)));
        }

        let (width, height) = DEFAULT_DRAWABLE_SIZE;
        let native = self.backend.create_drawable(DrawableDesc {
            width,
            height,
            double_buffered: self.double_buffered,
        })?;

        inner.next_drawable += 1;
        let drawable = Arc::new(Drawable {
            id: DrawableId::from_raw(inner.next_drawable),
            handle,
            native,
            width: AtomicU32::new(width),
            height: AtomicU32::new(height),
            double_buffered: self.double_buffered,
        });
        tracing::debug!(handle = %handle, drawable = %drawable.id, native = %native, "created drawable");
        inner.drawables.insert(handle, Arc::clone(&drawable));
        Ok(Some(drawable))
    }

    /// Look up a context without creating it
    #[must_use]
    pub fn context(&self, handle: TraceHandle) -> Option<Arc<Context>> {
        self.lock().contexts.get(&handle).cloned()
    }

    /// Look up a drawable without creating it
    #[must_use]
    pub fn drawable(&self, handle: TraceHandle) -> Option<Arc<Drawable>> {
        self.lock().drawables.get(&handle).cloned()
    }

    /// Remove a context entry.
    ///
    /// The native context is destroyed right away unless it belongs to a
    /// shared group with other live members; then it is retired and
    /// destroyed together with the last member.
    pub fn destroy_context(&self, handle: TraceHandle) -> bool {
        let mut inner = self.lock();
        let Some(context) = inner.contexts.shift_remove(&handle) else {
            return false;
        };
        if inner
            .seed
            .as_ref()
            .is_some_and(|seed| Arc::ptr_eq(seed, &context))
        {
            // the earliest surviving member of the seed's group takes over
            let successor = context.shared_group().and_then(|group| {
                inner
                    .contexts
                    .values()
                    .find(|c| c.shared_group() == Some(group))
                    .cloned()
            });
            if let Some(next) = &successor {
                tracing::debug!(context = %next.id, "seed context replaced");
            }
            inner.seed = successor;
        }
        self.release_context(&mut inner, &context);
        true
    }

    /// Remove a drawable entry and destroy its native drawable
    pub fn destroy_drawable(&self, handle: TraceHandle) -> bool {
        let mut inner = self.lock();
        let Some(drawable) = inner.drawables.shift_remove(&handle) else {
            return false;
        };
        self.backend.destroy_drawable(drawable.native);
        true
    }

    /// Remove both the context and the drawable registered for `handle`
    pub fn destroy(&self, handle: TraceHandle) -> bool {
        let context = self.destroy_context(handle);
        let drawable = self.destroy_drawable(handle);
        context || drawable
    }

    fn release_context(&self, inner: &mut Inner, context: &Context) {
        let Some(group) = context.shared_group() else {
            self.backend.destroy_context(context.native);
            return;
        };
        let Some(members) = inner.groups.get_mut(&group) else {
            self.backend.destroy_context(context.native);
            return;
        };
        members.live = members.live.saturating_sub(1);
        if members.live > 0 {
            tracing::debug!(
                context = %context.id,
                group = %group,
                remaining = members.live,
                "deferring native destroy of shared context"
            );
            members.retired.push(context.native);
            return;
        }
        if let Some(members) = inner.groups.remove(&group) {
            for native in members.retired {
                self.backend.destroy_context(native);
            }
        }
        self.backend.destroy_context(context.native);
    }

    /// Destroy every remaining object, contexts first, in creation order
    pub fn teardown(&self) {
        let mut inner = self.lock();
        inner.seed = None;
        let contexts: Vec<_> = inner.contexts.drain(..).map(|(_, c)| c).collect();
        for context in &contexts {
            self.release_context(&mut inner, context);
        }
        let drawables: Vec<_> = inner.drawables.drain(..).map(|(_, d)| d).collect();
        for drawable in drawables {
            self.backend.destroy_drawable(drawable.native);
        }
    }

    /// Ids of live contexts in creation order
    #[must_use]
    pub fn context_ids(&self) -> Vec<ContextId> {
        self.lock().contexts.values().map(|c| c.id).collect()
    }

    /// Ids of live drawables in creation order
    #[must_use]
    pub fn drawable_ids(&self) -> Vec<DrawableId> {
        self.lock().drawables.values().map(|d| d.id).collect()
    }

    /// Number of live contexts
    #[must_use]
    pub fn context_count(&self) -> usize {
        self.lock().contexts.len()
    }

    /// Number of live drawables
    #[must_use]
    pub fn drawable_count(&self) -> usize {
        self.lock().drawables.len()
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, HeadlessBackend};
    use proptest::prelude::*;

    fn registry() -> (Arc<HeadlessBackend>, HandleRegistry) {
        let backend = Arc::new(HeadlessBackend::new());
        let registry = HandleRegistry::new(backend.clone(), true);
        (backend, registry)
    }

    fn h(raw: u64) -> TraceHandle {
        TraceHandle::from_raw(raw)
    }

    #[test]
    fn test_null_handle_creates_nothing() {
        let (backend, registry) = registry();
        assert!(registry.get_or_create_context(h(0), None).unwrap().is_none());
        assert!(registry.get_or_create_drawable(h(0)).unwrap().is_none());
        assert!(backend.ops().is_empty());
    }

    #[test]
    fn test_same_handle_same_object() {
        let (backend, registry) = registry();
        let a = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        let b = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.live_contexts(), 1);
    }

    #[test]
    fn test_contexts_and_drawables_are_separate_maps() {
        let (_backend, registry) = registry();
        let ctx = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        let drawable = registry.get_or_create_drawable(h(1)).unwrap().unwrap();
        assert_eq!(ctx.handle(), drawable.handle());
        assert_ne!(ctx.native(), drawable.native());
    }

    #[test]
    fn test_distinct_drawables_per_handle() {
        let (_backend, registry) = registry();
        let a = registry.get_or_create_drawable(h(1)).unwrap().unwrap();
        let b = registry.get_or_create_drawable(h(2)).unwrap().unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.drawable_count(), 2);
        assert_eq!(registry.drawable_ids(), vec![a.id(), b.id()]);
        assert!(registry.destroy_drawable(h(1)));
        assert_eq!(registry.drawable_ids(), vec![b.id()]);
    }

    #[test]
    fn test_shared_group_propagation() {
        let (_backend, registry) = registry();
        let a = registry.get_or_create_context(h(0xa), None).unwrap().unwrap();
        assert_eq!(a.shared_group(), None);

        let b = registry
            .get_or_create_context(h(0xb), Some(h(0xa)))
            .unwrap()
            .unwrap();
        let c = registry
            .get_or_create_context(h(0xc), Some(h(0xb)))
            .unwrap()
            .unwrap();

        let group = a.shared_group().unwrap();
        assert_eq!(b.shared_group(), Some(group));
        assert_eq!(c.shared_group(), Some(group));
    }

    #[test]
    fn test_share_with_seed() {
        let (backend, registry) = registry();
        let first = registry
            .get_or_create_context_with(h(1), ShareWith::Seed)
            .unwrap()
            .unwrap();
        let second = registry
            .get_or_create_context_with(h(2), ShareWith::Seed)
            .unwrap()
            .unwrap();
        assert_eq!(first.shared_group(), second.shared_group());
        assert!(backend.ops().contains(&BackendOp::CreateContext {
            native: second.native(),
            share: Some(first.native()),
        }));
    }

    #[test]
    fn test_seed_passes_to_oldest_group_member() {
        let (backend, registry) = registry();
        let seed = |raw| {
            registry
                .get_or_create_context_with(h(raw), ShareWith::Seed)
                .unwrap()
                .unwrap()
        };
        let first = seed(1);
        let second = seed(2);
        let third = seed(3);
        assert!(registry.destroy_context(h(1)));

        let fourth = seed(4);
        assert_eq!(fourth.shared_group(), first.shared_group());
        assert!(backend.ops().contains(&BackendOp::CreateContext {
            native: fourth.native(),
            share: Some(second.native()),
        }));
        assert_eq!(
            registry.context_ids(),
            vec![second.id(), third.id(), fourth.id()]
        );
    }

    #[test]
    fn test_ungrouped_seed_destroy_starts_fresh() {
        let (_backend, registry) = registry();
        registry
            .get_or_create_context_with(h(1), ShareWith::Seed)
            .unwrap();
        assert!(registry.destroy_context(h(1)));
        let next = registry
            .get_or_create_context_with(h(2), ShareWith::Seed)
            .unwrap()
            .unwrap();
        assert_eq!(next.shared_group(), None);
    }

    #[test]
    fn test_unknown_share_handle_is_ignored() {
        let (_backend, registry) = registry();
        let ctx = registry
            .get_or_create_context(h(1), Some(h(0x99)))
            .unwrap()
            .unwrap();
        assert_eq!(ctx.shared_group(), None);
    }

    #[test]
    fn test_destroy_then_recreate_gives_new_object() {
        let (_backend, registry) = registry();
        let a = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        assert!(registry.destroy_context(h(1)));
        assert!(!registry.destroy_context(h(1)));
        let b = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_shared_group_defers_native_destroy() {
        let (backend, registry) = registry();
        let a = registry.get_or_create_context(h(1), None).unwrap().unwrap();
        let b = registry
            .get_or_create_context(h(2), Some(h(1)))
            .unwrap()
            .unwrap();

        registry.destroy_context(h(1));
        assert_eq!(backend.live_contexts(), 2);
        assert!(registry.context(h(1)).is_none());

        registry.destroy_context(h(2));
        assert_eq!(backend.live_contexts(), 0);
        let ops = backend.ops();
        assert!(ops.contains(&BackendOp::DestroyContext(a.native())));
        assert!(ops.contains(&BackendOp::DestroyContext(b.native())));
    }

    #[test]
    fn test_destroy_both_for_handle() {
        let (backend, registry) = registry();
        registry.get_or_create_context(h(1), None).unwrap();
        registry.get_or_create_drawable(h(1)).unwrap();
        assert!(registry.destroy(h(1)));
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_drawables(), 0);
        assert!(!registry.destroy(h(1)));
    }

    #[test]
    fn test_creation_failure_leaves_no_entry() {
        let backend = Arc::new(HeadlessBackend::new().with_failing_context_creation());
        let registry = HandleRegistry::new(backend, true);
        assert!(registry.get_or_create_context(h(1), None).is_err());
        assert_eq!(registry.context_count(), 0);
    }

    #[test]
    fn test_teardown_destroys_everything() {
        let backend = Arc::new(HeadlessBackend::new());
        {
            let registry = HandleRegistry::new(backend.clone(), false);
            registry.get_or_create_context(h(1), None).unwrap();
            registry.get_or_create_context(h(2), Some(h(1))).unwrap();
            registry.get_or_create_drawable(h(1)).unwrap();
        }
        assert_eq!(backend.live_contexts(), 0);
        assert_eq!(backend.live_drawables(), 0);
    }

    #[test]
    fn test_concurrent_lookup_creates_once() {
        let (backend, registry) = registry();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    registry.get_or_create_context(h(7), None).unwrap();
                });
            }
        });
        assert_eq!(backend.live_contexts(), 1);
    }

    #[test]
    fn test_drawable_grow() {
        let (_backend, registry) = registry();
        let d = registry.get_or_create_drawable(h(1)).unwrap().unwrap();
        assert_eq!(d.size(), DEFAULT_DRAWABLE_SIZE);
        assert_eq!(d.grow_to(100, 100), None);
        assert_eq!(d.grow_to(640, 100), Some((640, 256)));
        assert!(d.is_double_buffered());
    }

    proptest! {
        #[test]
        fn prop_handle_resolution_is_stable(handles in proptest::collection::vec(1u64..6, 1..40)) {
            let (_backend, registry) = registry();
            let mut first: HashMap<u64, Arc<Context>> = HashMap::new();
            for raw in handles {
                let ctx = registry.get_or_create_context(h(raw), None).unwrap().unwrap();
                let seen = first.entry(raw).or_insert_with(|| Arc::clone(&ctx));
                prop_assert!(Arc::ptr_eq(seen, &ctx));
            }
            prop_assert_eq!(registry.context_count(), first.len());
        }
    }
}
