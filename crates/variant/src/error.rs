/// Errors raised by variant construction, mutation, and serialization.
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    #[error("wrong type: expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("key not found: {key}")]
    NoSuchKey { key: String },

    #[error("index out of bounds: {index} (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("container would contain a reference cycle")]
    Cyclic,

    #[error("value cannot be represented by the requested serialization option set")]
    Unrepresentable,

    #[error("out of memory while constructing a variant")]
    OutOfMemory,

    #[error("dynamic variant has no getter")]
    NoGetter,

    #[error("dynamic variant has no setter")]
    NoSetter,

    #[error("serialization failed: {message}")]
    Serialization { message: String },
}

pub type VariantResult<T> = Result<T, VariantError>;
