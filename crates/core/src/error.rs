use thiserror::Error;

/// Failures while acquiring raw source material (network, parsing, PDF).
///
/// Every variant is eligible for the stale-cache fallback; only when no
/// previous cache entry exists does the error reach the caller.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url in source spec: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("document has no extractable text layer: {0}")]
    UnreadableDocument(String),

    #[error("page yielded no usable content: {0}")]
    EmptyPage(String),
}

/// Per-chunk embedding failure. Isolated to the failing chunk; the rest
/// of the document still proceeds.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    #[error("embedding backend failure: {0}")]
    Backend(String),

    #[error("embedding has {actual} components, store expects {expected}")]
    WrongArity { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Fatal configuration bug, never retried.
    #[error("vector dimension {actual} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("store was built with embedder '{stored}', configured embedder is '{configured}'")]
    ModelMismatch { stored: String, configured: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Query-time failure in the retrieval facade, propagated to the consumer.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = AcquireError> = std::result::Result<T, E>;
