//! Reference-counted polymorphic value store for the PurC HVML runtime.
//!
//! Every runtime value — element attributes, context symbols, message
//! payloads, fetcher results — is a [`Variant`]. Containers broadcast a
//! `change` notification (see [`container::ChangeListener`]) to any
//! listener attached with [`Variant::on_change`]; the observer registry
//! in the runtime crate uses this to implement the `change` event.

pub mod atom;
pub mod container;
pub mod dynamic;
pub mod error;
pub mod native;
pub mod serialize;
#[allow(clippy::module_inception)]
mod variant;

pub use atom::{intern, try_lookup, Atom, AtomBucketId};
pub use container::{ChangeListener, Container};
pub use dynamic::DynamicVariant;
pub use error::{VariantError, VariantResult};
pub use native::NativeEntity;
pub use serialize::{from_ejson, to_ejson, ByteSequenceEncoding, EjsonFormat, SerializeOptions};
pub use variant::{Variant, VariantArray, VariantObject, VariantSet};
