//! The native variant: an opaque entity paired with a virtual table of
//! operations, as described for the variant store's native values.

use crate::error::{VariantError, VariantResult};
use crate::variant::Variant;

/// Operations a native entity supports. All methods have a default that
/// reports "unsupported" so an entity only needs to implement the
/// operations it actually offers.
pub trait NativeEntity: Send + Sync {
    /// A short, stable name used in diagnostics and `Debug` output.
    fn type_name(&self) -> &'static str;

    fn property_getter(&self, _name: &str) -> VariantResult<Variant> {
        Err(VariantError::NoSuchKey {
            key: _name.to_string(),
        })
    }

    fn property_setter(&self, name: &str, _value: Variant) -> VariantResult<()> {
        Err(VariantError::NoSuchKey {
            key: name.to_string(),
        })
    }

    /// Answers whether `candidate` is a logical alias of this entity,
    /// used for selector-style observer matches.
    fn did_matched(&self, _candidate: &Variant) -> bool {
        false
    }

    /// Called when an observer holding this entity as its observed value
    /// is revoked.
    fn on_forget(&self) {}

    /// Called once, when the last strong reference to the wrapping
    /// variant is dropped.
    fn on_release(&self) {}
}
