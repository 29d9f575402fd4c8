//! vDOM/DOM tree, renderer transport, and fetcher — the external
//! collaborators `spec.md` §1 names and reaches only through the
//! narrow interfaces in this crate.

pub mod dom;
pub mod error;
pub mod fetcher;
pub mod renderer;
pub mod vdom;

pub use dom::{DomHandle, DomSink, InMemoryDom};
pub use error::{DomError, DomResult};
pub use fetcher::{FetchCallback, FetchId, FetchOutcome, Fetcher};
pub use renderer::{LoopbackRenderer, RendererMessage, RendererMessageKind, RendererTransport};
pub use vdom::{parse, AttrOp, Attribute, Element, Expr};
