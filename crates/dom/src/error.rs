/// Errors raised while parsing a vDOM tree, mutating the live DOM, or
/// talking to a renderer connection.
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    #[error("vdom parse error at byte {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("no such attribute: {0}")]
    NoSuchAttribute(String),

    #[error("renderer connection is closed")]
    ConnectionClosed,

    #[error("renderer request failed: {0}")]
    RendererRequest(String),

    #[error("fetcher request failed: {0}")]
    FetchFailed(String),
}

pub type DomResult<T> = Result<T, DomError>;
