use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("failed to download document: {status}")]
    Download { status: u16 },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid document reference: {0}")]
    InvalidReference(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("docx parse error: {0}")]
    DocxParse(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("cannot build an index from zero vectors")]
    EmptyInput,

    #[error("vector dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model {model} is not available: {details}")]
    Unavailable { model: String, details: String },

    #[error("{backend} returned {status}: {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} returned {found} embeddings for {expected} inputs")]
    EmbeddingCount {
        backend: String,
        expected: usize,
        found: usize,
    },

    #[error("{0} returned an empty response")]
    EmptyResponse(String),

    #[error("invalid model config: {0}")]
    InvalidConfig(String),

    #[error("no chat model is available; check API access for: {0}")]
    NoModelAvailable(String),
}

impl ModelError {
    /// True when the next model in a fallback list should be tried.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ModelError::Unavailable { .. })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("document has no extractable text")]
    EmptyDocument,

    #[error("embedding failed: {0}")]
    Embedding(#[from] ModelError),

    #[error("index error: {0}")]
    Index(#[from] SearchError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
