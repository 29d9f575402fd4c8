//! Interned string identifiers, kept in named buckets.
//!
//! An atom never disappears once created: the bucket holds a strong
//! reference to the interned string for the lifetime of the process.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use dashmap::DashMap;

/// The named bucket an atom was interned into.
///
/// `Msg` holds message type/sub-type names (`callState`, `idle`, ...).
/// `User` holds names the hosting program interns itself (coroutine
/// full names, dynamic-object keys, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomBucketId {
    Msg,
    User,
}

impl AtomBucketId {
    fn index(self) -> usize {
        match self {
            AtomBucketId::Msg => 0,
            AtomBucketId::User => 1,
        }
    }
}

/// An interned string id. Cheap to copy and compare; the backing string
/// is recovered with [`Atom::as_str`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom {
    bucket: AtomBucketId,
    id: u32,
}

impl Atom {
    pub fn bucket(self) -> AtomBucketId {
        self.bucket
    }

    pub fn as_str(self) -> Arc<str> {
        registry().bucket(self.bucket).reverse_lookup(self.id)
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?}:{})", self.bucket, self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct AtomBucket {
    forward: DashMap<Arc<str>, u32>,
    reverse: RwLock<Vec<Arc<str>>>,
    next_id: AtomicU32,
}

impl AtomBucket {
    fn new() -> Self {
        Self {
            forward: DashMap::new(),
            reverse: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(1),
        }
    }

    fn intern(&self, name: &str) -> u32 {
        if let Some(id) = self.forward.get(name) {
            return *id;
        }
        let arc: Arc<str> = Arc::from(name);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.forward.insert(arc.clone(), id);
        let mut reverse = self.reverse.write().expect("atom reverse table poisoned");
        reverse.push(arc);
        id
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.forward.get(name).map(|v| *v)
    }

    fn reverse_lookup(&self, id: u32) -> Arc<str> {
        let reverse = self.reverse.read().expect("atom reverse table poisoned");
        reverse
            .get((id - 1) as usize)
            .cloned()
            .expect("atom id was never interned in this bucket")
    }
}

struct AtomRegistry {
    buckets: [AtomBucket; 2],
}

impl AtomRegistry {
    fn new() -> Self {
        Self {
            buckets: [AtomBucket::new(), AtomBucket::new()],
        }
    }

    fn bucket(&self, id: AtomBucketId) -> &AtomBucket {
        &self.buckets[id.index()]
    }
}

fn registry() -> &'static AtomRegistry {
    static REGISTRY: OnceLock<AtomRegistry> = OnceLock::new();
    REGISTRY.get_or_init(AtomRegistry::new)
}

/// Interns `name` in `bucket`, returning its atom. Interning the same
/// string in the same bucket twice returns the same atom.
pub fn intern(bucket: AtomBucketId, name: &str) -> Atom {
    let id = registry().bucket(bucket).intern(name);
    Atom { bucket, id }
}

/// Looks up an already-interned atom without creating one.
pub fn try_lookup(bucket: AtomBucketId, name: &str) -> Option<Atom> {
    registry()
        .bucket(bucket)
        .lookup(name)
        .map(|id| Atom { bucket, id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_string_twice_returns_the_same_atom() {
        let a = intern(AtomBucketId::Msg, "idle");
        let b = intern(AtomBucketId::Msg, "idle");
        assert_eq!(a, b);
        assert_eq!(&*a.as_str(), "idle");
    }

    #[test]
    fn buckets_are_independent() {
        let msg = intern(AtomBucketId::Msg, "change");
        let user = intern(AtomBucketId::User, "change");
        assert_ne!(msg, user);
        assert_eq!(&*msg.as_str(), &*user.as_str());
    }

    #[test]
    fn try_lookup_misses_until_interned() {
        assert!(try_lookup(AtomBucketId::User, "never-interned-xyz").is_none());
        let atom = intern(AtomBucketId::User, "never-interned-xyz");
        assert_eq!(try_lookup(AtomBucketId::User, "never-interned-xyz"), Some(atom));
    }
}
