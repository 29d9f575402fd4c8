//! The variant itself: a tagged, reference-counted, polymorphic value.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::container::Container;
use crate::dynamic::DynamicVariant;
use crate::error::{VariantError, VariantResult};
use crate::native::NativeEntity;

pub type VariantArray = Container<Vec<Variant>>;
pub type VariantObject = Container<IndexMap<Arc<str>, Variant>>;
pub type VariantSet = Container<Vec<Variant>>;

/// The runtime's polymorphic value. Cloning a `Variant` is `O(1)`: scalar
/// payloads are copied by value, container and entity payloads share
/// their backing storage through `Arc`/[`Container`].
#[derive(Clone)]
pub enum Variant {
    Null,
    Boolean(bool),
    Number(f64),
    LongInt(i64),
    ULongInt(u64),
    String(Arc<str>),
    ByteSequence(Arc<[u8]>),
    Array(VariantArray),
    Object(VariantObject),
    /// Sets dedup by structural equality on insert; `spec.md` does not
    /// require a hashed unique-key index, so a flat vector with linear
    /// dedup is the simplest container that satisfies "reject
    /// duplicates" without inventing unneeded machinery.
    Set(VariantSet),
    Tuple(Arc<[Variant]>),
    Native(Arc<dyn NativeEntity>),
    Dynamic(Arc<DynamicVariant>),
}

impl Variant {
    pub fn make_null() -> Self {
        Variant::Null
    }

    pub fn make_boolean(v: bool) -> Self {
        Variant::Boolean(v)
    }

    pub fn make_number(v: f64) -> Self {
        Variant::Number(v)
    }

    pub fn make_long_int(v: i64) -> Self {
        Variant::LongInt(v)
    }

    pub fn make_ulong_int(v: u64) -> Self {
        Variant::ULongInt(v)
    }

    pub fn make_string(v: impl Into<Arc<str>>) -> Self {
        Variant::String(v.into())
    }

    pub fn make_byte_sequence(v: impl Into<Arc<[u8]>>) -> Self {
        Variant::ByteSequence(v.into())
    }

    pub fn make_array(items: impl IntoIterator<Item = Variant>) -> Self {
        Variant::Array(Container::new(items.into_iter().collect()))
    }

    pub fn make_empty_array() -> Self {
        Variant::Array(Container::new(Vec::new()))
    }

    pub fn make_object(entries: impl IntoIterator<Item = (Arc<str>, Variant)>) -> Self {
        Variant::Object(Container::new(entries.into_iter().collect()))
    }

    pub fn make_empty_object() -> Self {
        Variant::Object(Container::new(IndexMap::new()))
    }

    pub fn make_empty_set() -> Self {
        Variant::Set(Container::new(Vec::new()))
    }

    pub fn make_tuple(items: impl IntoIterator<Item = Variant>) -> Self {
        Variant::Tuple(items.into_iter().collect::<Vec<_>>().into())
    }

    pub fn make_native(entity: Arc<dyn NativeEntity>) -> Self {
        Variant::Native(entity)
    }

    pub fn make_dynamic(entity: DynamicVariant) -> Self {
        Variant::Dynamic(Arc::new(entity))
    }

    /// A short, stable name of the variant's type, used in diagnostics
    /// and in [`VariantError`] messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Null => "null",
            Variant::Boolean(_) => "boolean",
            Variant::Number(_) => "number",
            Variant::LongInt(_) => "longint",
            Variant::ULongInt(_) => "ulongint",
            Variant::String(_) => "string",
            Variant::ByteSequence(_) => "bsequence",
            Variant::Array(_) => "array",
            Variant::Object(_) => "object",
            Variant::Set(_) => "set",
            Variant::Tuple(_) => "tuple",
            Variant::Native(_) => "native",
            Variant::Dynamic(_) => "dynamic",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Variant::Array(_) | Variant::Object(_) | Variant::Set(_))
    }

    /// Number of live handles sharing this variant's backing storage.
    /// Scalars report `None`: they have no shared storage to count.
    pub fn ref_count(&self) -> Option<usize> {
        match self {
            Variant::String(s) => Some(Arc::strong_count(s)),
            Variant::ByteSequence(b) => Some(Arc::strong_count(b)),
            Variant::Array(c) => Some(c.strong_count()),
            Variant::Object(c) => Some(c.strong_count()),
            Variant::Set(c) => Some(c.strong_count()),
            Variant::Tuple(t) => Some(Arc::strong_count(t)),
            Variant::Native(n) => Some(Arc::strong_count(n)),
            Variant::Dynamic(d) => Some(Arc::strong_count(d)),
            _ => None,
        }
    }

    /// Appends `value` to an array variant, broadcasting `change` to any
    /// attached listeners.
    pub fn array_append(&self, value: Variant) -> VariantResult<()> {
        match self {
            Variant::Array(container) => {
                container.mutate(|v| v.push(value));
                Ok(())
            }
            other => Err(VariantError::WrongType {
                expected: "array",
                found: other.type_name(),
            }),
        }
    }

    pub fn object_set(&self, key: impl Into<Arc<str>>, value: Variant) -> VariantResult<()> {
        match self {
            Variant::Object(container) => {
                container.mutate(|m| {
                    m.insert(key.into(), value);
                });
                Ok(())
            }
            other => Err(VariantError::WrongType {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }

    pub fn object_get(&self, key: &str) -> VariantResult<Variant> {
        match self {
            Variant::Object(container) => container
                .read()
                .get(key)
                .cloned()
                .ok_or_else(|| VariantError::NoSuchKey { key: key.to_string() }),
            other => Err(VariantError::WrongType {
                expected: "object",
                found: other.type_name(),
            }),
        }
    }

    /// Inserts `value` into a set, rejecting it silently (returning
    /// `Ok(false)`) if an equal member is already present.
    pub fn set_add(&self, value: Variant) -> VariantResult<bool> {
        match self {
            Variant::Set(container) => {
                let inserted = container.mutate(|members| {
                    if members.iter().any(|m| m == &value) {
                        false
                    } else {
                        members.push(value);
                        true
                    }
                });
                Ok(inserted)
            }
            other => Err(VariantError::WrongType {
                expected: "set",
                found: other.type_name(),
            }),
        }
    }

    /// Deep-clones containers; scalars and entity variants are returned
    /// as cheap shared-handle clones (an entity has no meaningful
    /// independent copy, and cloning its handle matches the "ref" op).
    pub fn deep_clone(&self) -> Variant {
        match self {
            Variant::Array(container) => {
                Variant::make_array(container.read().iter().map(Variant::deep_clone))
            }
            Variant::Object(container) => Variant::make_object(
                container
                    .read()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.deep_clone())),
            ),
            Variant::Set(container) => {
                let members = container.read().iter().map(Variant::deep_clone).collect::<Vec<_>>();
                Variant::Set(Container::new(members))
            }
            Variant::Tuple(items) => {
                Variant::make_tuple(items.iter().map(Variant::deep_clone))
            }
            other => other.clone(),
        }
    }

    /// Registers a listener invoked after every mutation of this
    /// container variant. No-op (returns `false`) for non-containers.
    pub fn on_change(&self, listener: crate::container::ChangeListener) -> bool {
        match self {
            Variant::Array(c) => {
                c.add_listener(listener);
                true
            }
            Variant::Object(c) => {
                c.add_listener(listener);
                true
            }
            Variant::Set(c) => {
                c.add_listener(listener);
                true
            }
            _ => false,
        }
    }

    /// Answers whether a native entity considers `candidate` a logical
    /// alias of itself; used by the observer registry's default match
    /// predicate. Non-native variants fall back to structural equality.
    pub fn did_matched(&self, candidate: &Variant) -> bool {
        match self {
            Variant::Native(entity) => entity.did_matched(candidate),
            _ => self == candidate,
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Null, Variant::Null) => true,
            (Variant::Boolean(a), Variant::Boolean(b)) => a == b,
            (Variant::Number(a), Variant::Number(b)) => a == b,
            (Variant::LongInt(a), Variant::LongInt(b)) => a == b,
            (Variant::ULongInt(a), Variant::ULongInt(b)) => a == b,
            (Variant::String(a), Variant::String(b)) => a == b,
            (Variant::ByteSequence(a), Variant::ByteSequence(b)) => a == b,
            (Variant::Array(a), Variant::Array(b)) => *a.read() == *b.read(),
            (Variant::Object(a), Variant::Object(b)) => *a.read() == *b.read(),
            (Variant::Set(a), Variant::Set(b)) => *a.read() == *b.read(),
            (Variant::Tuple(a), Variant::Tuple(b)) => a == b,
            (Variant::Native(a), Variant::Native(b)) => Arc::ptr_eq(a, b),
            (Variant::Dynamic(a), Variant::Dynamic(b)) => a.is_same(b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Boolean(v) => write!(f, "{v}"),
            Variant::Number(v) => write!(f, "{v}"),
            Variant::LongInt(v) => write!(f, "{v}L"),
            Variant::ULongInt(v) => write!(f, "{v}UL"),
            Variant::String(v) => write!(f, "{v:?}"),
            Variant::ByteSequence(v) => write!(f, "bsequence({} bytes)", v.len()),
            Variant::Array(c) => write!(f, "array({} items)", c.read().len()),
            Variant::Object(c) => write!(f, "object({} keys)", c.read().len()),
            Variant::Set(c) => write!(f, "set({} members)", c.read().len()),
            Variant::Tuple(t) => write!(f, "tuple({} items)", t.len()),
            Variant::Native(n) => write!(f, "native({})", n.type_name()),
            Variant::Dynamic(_) => write!(f, "dynamic"),
        }
    }
}
