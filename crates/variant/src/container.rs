//! Shared container plumbing: reference-counted storage plus the
//! change-observer broadcast every mutating container operation fires.

use std::sync::Arc;

use parking_lot::RwLock;

/// Called whenever the container it was attached to is mutated.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// Reference-counted, interior-mutable container shared by `Array`,
/// `Object`, and `Set` variants.
///
/// Cloning a `Container` clones the handle, not the data: all clones
/// observe each other's mutations, matching the variant store's
/// "containers hold strong references, mutation is shared" contract.
pub struct Container<T> {
    inner: Arc<RwLock<Inner<T>>>,
}

struct Inner<T> {
    data: T,
    listeners: Vec<ChangeListener>,
}

impl<T> Clone for Container<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Default for Container<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Container<T> {
    pub fn new(data: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                data,
                listeners: Vec::new(),
            })),
        }
    }

    pub fn read(&self) -> parking_lot::MappedRwLockReadGuard<'_, T> {
        parking_lot::RwLockReadGuard::map(self.inner.read(), |inner| &inner.data)
    }

    /// Runs `f` against the mutable data and broadcasts `change` to every
    /// attached listener once `f` returns. Listeners run after the write
    /// lock is released, so a listener may itself read the container.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, listeners) = {
            let mut guard = self.inner.write();
            let result = f(&mut guard.data);
            (result, guard.listeners.clone())
        };
        for listener in listeners {
            listener();
        }
        result
    }

    pub fn add_listener(&self, listener: ChangeListener) {
        self.inner.write().listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.read().listeners.len()
    }

    /// Identity comparison: two handles refer to the same container.
    pub fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}
