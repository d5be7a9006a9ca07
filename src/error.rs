use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Prefix put in front of every error rendered for the interactive caller
pub const FAILURE_MARKER: &str = "❌ Error:";

/// Errors produced by the retrieval pipeline
#[derive(Debug, Error)]
pub enum RagError {
    /// Bad chunking parameters, missing credentials or unparseable settings
    #[error("configuration error: {0}")]
    Config(String),

    #[error("corpus not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("corpus contains no text to index")]
    EmptyCorpus,

    /// The corpus exists but could not be turned into text
    #[error("failed to read corpus {}: {reason}", .path.display())]
    Document { path: PathBuf, reason: String },

    #[error("vector has dimension {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("got {embeddings} embeddings for {chunks} chunks")]
    EmbeddingCount { chunks: usize, embeddings: usize },

    #[error("embedding {position} contains NaN or infinite values")]
    NonFiniteEmbedding { position: usize },

    #[error("index holds no chunks")]
    EmptyIndex,

    #[error("persisted index {} is corrupt: {reason}", .path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// Embedding provider failure while building the index
    #[error("failed to embed corpus: {0}")]
    Embedding(#[source] ProviderError),

    /// Embedding or search failure at query time
    #[error("retrieval failed: {0}")]
    Retrieval(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("answer generation failed: {0}")]
    Generation(#[source] ProviderError),

    #[error("answer generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors reported by embedding and generation providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed: {status} {body}")]
    Api { status: u16, body: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

/// Render an error as a string the interactive caller can display as an answer
pub fn render_error(error: &RagError) -> String {
    format!("{} {}", FAILURE_MARKER, error)
}
