//! The dynamic variant: a getter/setter pair of callbacks, as described
//! for the variant store's dynamic values.

use std::sync::Arc;

use crate::error::{VariantError, VariantResult};
use crate::variant::Variant;

type Getter = Arc<dyn Fn() -> VariantResult<Variant> + Send + Sync>;
type Setter = Arc<dyn Fn(Variant) -> VariantResult<()> + Send + Sync>;

/// A value computed (and optionally assigned) through host-supplied
/// closures rather than stored inline.
#[derive(Clone)]
pub struct DynamicVariant {
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl DynamicVariant {
    pub fn new(getter: Option<Getter>, setter: Option<Setter>) -> Self {
        Self { getter, setter }
    }

    pub fn read_only(getter: Getter) -> Self {
        Self::new(Some(getter), None)
    }

    pub fn get(&self) -> VariantResult<Variant> {
        match &self.getter {
            Some(getter) => getter(),
            None => Err(VariantError::NoGetter),
        }
    }

    pub fn set(&self, value: Variant) -> VariantResult<()> {
        match &self.setter {
            Some(setter) => setter(value),
            None => Err(VariantError::NoSetter),
        }
    }

    pub fn is_same(&self, other: &Self) -> bool {
        let getter_eq = match (&self.getter, &other.getter) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        let setter_eq = match (&self.setter, &other.setter) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        getter_eq && setter_eq
    }
}
