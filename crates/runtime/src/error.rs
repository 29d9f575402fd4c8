//! Runtime error kinds (`spec.md` §7) and the static error→exception
//! atom table the post-step check in [`crate::scheduler`] consults.

use purc_variant::Atom;

use crate::atom::except_atom;

/// The error kinds `spec.md` §7 distinguishes, plus an open slot for
/// any HVML exception named by atom (`BadName`, `NoSuchKey`, ...)
/// raised by a verb rather than by the runtime itself.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("wrong arguments: {0}")]
    WrongArgs(String),

    #[error("not ready: {0}")]
    NotReady(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// Non-fatal short-circuit; never reaches a coroutine's exception
    /// machinery (see `purc_variant`-free re-export at crate root).
    #[error("stop")]
    Stop,

    #[error("renderer I/O error: {0}")]
    Io(String),

    #[error("renderer peer closed the connection")]
    PeerClosed,

    /// Tells `execute_one_step` to run the same frame again next
    /// tick. Resolves Open Question 1 of `spec.md` §9: this is a
    /// distinct variant the scheduler matches on *before* any
    /// exception handling, not a normal error fed into catch/except.
    #[error("again")]
    Again,

    /// The per-instance move-buffer was at capacity when a
    /// cross-instance post was attempted. Resolves Open Question 3 of
    /// `spec.md` §9: surfaced immediately, no retry.
    #[error("move buffer is full")]
    MoveBufferFull,

    /// An arbitrary HVML exception, named by atom (e.g. `BadName`).
    #[error("exception: {0}")]
    Exception(Atom),

    #[error(transparent)]
    Variant(#[from] purc_variant::VariantError),

    #[error(transparent)]
    Dom(#[from] purc_dom::DomError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    pub fn invalid_value(message: impl Into<String>) -> Self {
        RuntimeError::InvalidValue(message.into())
    }

    pub fn wrong_args(message: impl Into<String>) -> Self {
        RuntimeError::WrongArgs(message.into())
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        RuntimeError::NotReady(message.into())
    }

    pub fn exception(name: &str) -> Self {
        RuntimeError::Exception(except_atom(name))
    }

    /// `true` for the cooperative-reschedule discriminant that must
    /// never reach exception handling (`spec.md` §7).
    pub fn is_again(&self) -> bool {
        matches!(self, RuntimeError::Again)
    }

    /// Maps this error to the exception atom `spec.md` §7's static
    /// error→except table assigns it. Every kind maps to something: a
    /// well-known name for the built-in kinds, or the carried atom for
    /// `Exception`.
    pub fn except_atom(&self) -> Atom {
        match self {
            RuntimeError::OutOfMemory => except_atom("OutOfMemory"),
            RuntimeError::InvalidValue(_) => except_atom("InvalidValue"),
            RuntimeError::WrongArgs(_) => except_atom("WrongArgs"),
            RuntimeError::NotReady(_) => except_atom("NotReady"),
            RuntimeError::NotImplemented(_) => except_atom("NotImplemented"),
            RuntimeError::NotSupported(_) => except_atom("NotSupported"),
            RuntimeError::Stop => except_atom("Stop"),
            RuntimeError::Io(_) => except_atom("IoFailure"),
            RuntimeError::PeerClosed => except_atom("PeerClosed"),
            RuntimeError::MoveBufferFull => except_atom("MoveBufferFull"),
            RuntimeError::Exception(atom) => *atom,
            RuntimeError::Variant(_) => except_atom("InvalidValue"),
            RuntimeError::Dom(_) => except_atom("IoFailure"),
            RuntimeError::Again => unreachable!("`again` is intercepted before except mapping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn again_is_intercepted_before_any_except_mapping() {
        assert!(RuntimeError::Again.is_again());
    }

    #[test]
    fn named_exceptions_round_trip_through_the_atom_table() {
        let err = RuntimeError::exception("BadName");
        assert_eq!(err.except_atom().to_string(), "BadName");
    }

    #[test]
    fn builtin_kinds_map_to_stable_except_names() {
        assert_eq!(
            RuntimeError::WrongArgs("x".into()).except_atom().to_string(),
            "WrongArgs"
        );
    }
}
