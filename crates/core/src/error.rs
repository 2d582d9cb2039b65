use crate::models::ExtractionFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure talking to a hosted model (embedding or chat completion).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no API key configured for {0}")]
    MissingApiKey(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {service}: {details}")]
    MalformedResponse { service: String, details: String },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index has been built yet at {0}")]
    NotFound(String),

    #[error(
        "refusing to load index at {0} that was not built in this session; \
         trust it explicitly to load it"
    )]
    Untrusted(String),

    #[error("index at {path} is corrupt: {details}")]
    Corrupt { path: String, details: String },

    #[error("index was built with embedding model {found}, expected {expected}")]
    EmbeddingMismatch { expected: String, found: String },

    #[error("{vectors} vectors supplied for {chunks} chunks")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot build an index without chunks")]
    Empty,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Everything a Process or Ask action can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no text extracted from the uploaded PDFs")]
    EmptyInput { failures: Vec<ExtractionFailure> },

    #[error("question is empty")]
    EmptyQuestion,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
