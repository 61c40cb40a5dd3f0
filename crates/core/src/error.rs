use std::path::PathBuf;
use thiserror::Error;

/// Failure to load a single corpus item. Recorded and skipped, never fatal to a batch.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("no readable text in {0}")]
    EmptyText(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding api error: {0}")]
    Api(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding count {actual} doesn't match input count {expected}")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("language model unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("language model api error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse language model response: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("vector dimension {actual} is not {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "collection {collection} is being built by another process; delete {} if no build is running",
        .path.display()
    )]
    Locked { collection: String, path: PathBuf },
}

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("no documents were loaded from either PDFs or URLs")]
    NoDocuments,

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("No question provided")]
    EmptyQuestion,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AssistError {
    /// Errors the caller caused, rejected before any collaborator is invoked.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AssistError::EmptyQuestion | AssistError::Configuration(_))
    }
}

pub type Result<T, E = AssistError> = std::result::Result<T, E>;
