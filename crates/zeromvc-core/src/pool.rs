//! Single-instance-per-type registry.

use crate::lock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Hooks run by [`InstancePool`] around an instance's lifetime.
///
/// Both hooks default to no-ops.
pub trait Lifecycle: Send + Sync + 'static {
    /// Runs once, right after construction.
    fn init(&self) {}

    /// Runs once after [`init`](Lifecycle::init), and again on every
    /// [`InstancePool::restart_all`].
    fn start(&self) {}
}

struct Entry {
    instance: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Lifecycle>,
}

/// Filled once, by whichever caller gets to construct the type first.
type Slot = Arc<OnceLock<Entry>>;

/// Lazily constructs and caches one instance per type.
///
/// Lookups for a type that is not cached yet construct it, run
/// [`Lifecycle::init`] then [`Lifecycle::start`], and cache the result. Later
/// lookups return the same [`Arc`] until [`reset`](InstancePool::reset).
#[derive(Default)]
pub struct InstancePool {
    entries: Mutex<HashMap<TypeId, Slot>>,
}

impl InstancePool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached instance of `T`, constructing it with `make` if
    /// there is none.
    ///
    /// See [`get_or_create_shared`](InstancePool::get_or_create_shared).
    pub fn get_or_create<T: Lifecycle>(&self, make: impl FnOnce() -> T) -> Arc<T> {
        self.get_or_create_shared(|| Arc::new(make()))
    }

    /// Like [`get_or_create`](InstancePool::get_or_create) for a constructor
    /// that builds the [`Arc`] itself.
    ///
    /// `make` and the hooks run outside the pool's lock, so they may look up
    /// instances of other types, but not of `T` itself. Concurrent callers
    /// for the same type wait for the first one: `make` and the hooks run
    /// exactly once per cached instance.
    pub fn get_or_create_shared<T: Lifecycle>(&self, make: impl FnOnce() -> Arc<T>) -> Arc<T> {
        let slot = lock(&self.entries)
            .entry(TypeId::of::<T>())
            .or_default()
            .clone();

        let entry = slot.get_or_init(|| {
            let instance = make();
            instance.init();
            instance.start();
            tracing::debug!(instance = type_name::<T>(), "instance created");
            Entry {
                instance: instance.clone(),
                hooks: instance,
            }
        });

        match entry.instance.clone().downcast::<T>() {
            Ok(instance) => instance,
            // slots are keyed by the TypeId of what they hold
            Err(_) => unreachable!("instance pool slot for {} holds another type", type_name::<T>()),
        }
    }

    /// Like [`get_or_create`](InstancePool::get_or_create), building the
    /// instance with [`Default`].
    pub fn get_or_default<T: Lifecycle + Default>(&self) -> Arc<T> {
        self.get_or_create(T::default)
    }

    /// Return the cached instance of `T` without constructing one.
    pub fn get<T: Lifecycle>(&self) -> Option<Arc<T>> {
        let slot = lock(&self.entries).get(&TypeId::of::<T>())?.clone();
        let entry = slot.get()?;
        entry.instance.clone().downcast::<T>().ok()
    }

    /// Whether an instance of `T` is cached.
    pub fn contains<T: Lifecycle>(&self) -> bool {
        lock(&self.entries)
            .get(&TypeId::of::<T>())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of cached instances.
    pub fn len(&self) -> usize {
        lock(&self.entries)
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run [`Lifecycle::start`] again on every cached instance.
    pub fn restart_all(&self) {
        let hooks: Vec<Arc<dyn Lifecycle>> = lock(&self.entries)
            .values()
            .filter_map(|slot| slot.get().map(|entry| entry.hooks.clone()))
            .collect();
        for hook in hooks {
            hook.start();
        }
    }

    /// Drop every cached instance. Later lookups construct fresh ones.
    pub fn reset(&self) {
        let dropped = std::mem::take(&mut *lock(&self.entries));
        tracing::debug!(count = dropped.len(), "instance pool reset");
    }
}
