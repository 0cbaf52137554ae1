//! Index registry (design doc §9 "Global module state").
//!
//! The original keeps a process-wide linked list of index-id → instance
//! entries behind a registered-once cache-invalidation callback. This is
//! the encapsulated replacement the design doc asks for: a registry behind
//! a single mutex, with the invalidation and shutdown hooks as explicit
//! registered handlers rather than implicit global state. A host embeds one
//! of these (in a `static`, an `Arc`, whatever its own lifetime model
//! needs) rather than this crate owning a singleton itself.

use std::collections::HashMap;
use std::sync::Mutex;

pub type IndexId = u64;

type InvalidationHook = Box<dyn Fn(IndexId) + Send + Sync>;
type ShutdownHook = Box<dyn Fn() + Send + Sync>;

struct Hooks {
    invalidation: Option<InvalidationHook>,
    shutdown: Option<ShutdownHook>,
}

/// A registry of live index handles, keyed by an opaque id the host assigns
/// (e.g. the host relation's OID). `T` is whatever handle type the host
/// wants to look up later — typically an `Arc<Engine<...>>`.
pub struct Registry<T> {
    entries: Mutex<HashMap<IndexId, T>>,
    hooks: Mutex<Hooks>,
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Registry {
            entries: Mutex::new(HashMap::new()),
            hooks: Mutex::new(Hooks {
                invalidation: None,
                shutdown: None,
            }),
        }
    }

    /// Register the callback the host invokes when a relation's cache is
    /// invalidated out from under an index instance.
    pub fn set_invalidation_hook(&self, hook: impl Fn(IndexId) + Send + Sync + 'static) {
        self.hooks.lock().unwrap().invalidation = Some(Box::new(hook));
    }

    /// Register the callback run once at module shutdown, releasing any
    /// per-process caches this registry doesn't itself own.
    pub fn set_shutdown_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().unwrap().shutdown = Some(Box::new(hook));
    }

    pub fn register(&self, id: IndexId, handle: T) -> Option<T> {
        self.entries.lock().unwrap().insert(id, handle)
    }

    pub fn get(&self, id: IndexId) -> Option<T> {
        self.entries.lock().unwrap().get(&id).cloned()
    }

    /// Remove `id`'s entry (the host's relation-cache invalidated it; the
    /// index must be tolerant of a later re-open under the same id) and run
    /// the invalidation hook if one is registered.
    pub fn invalidate(&self, id: IndexId) {
        self.entries.lock().unwrap().remove(&id);
        if let Some(hook) = self.hooks.lock().unwrap().invalidation.as_ref() {
            hook(id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and run the shutdown hook if one is registered.
    /// Entries are torn down wholesale, mirroring the per-index arena
    /// release the design doc calls out under "memory ownership" — no
    /// per-bitmap free is required.
    pub fn shutdown(&self) {
        self.entries.lock().unwrap().clear();
        if let Some(hook) = self.hooks.lock().unwrap().shutdown.as_ref() {
            hook();
        }
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Registry::new()
    }
}
