use crate::DocId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by indexing and search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Caller passed input the operation cannot interpret, e.g. several terms
    /// where exactly one is required, or an out-of-range query parameter.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Component parameters that would make the operation degenerate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A persisted artifact required to serve queries is absent. Rebuild the cache.
    #[error("cache artifact missing: {} (rebuild the index)", artifact.display())]
    CacheMissing { artifact: PathBuf },

    /// Embedding requested for blank text.
    #[error("cannot generate an embedding for empty text")]
    EmptyInput,

    #[error("document {0} is not indexed")]
    UnknownDocument(DocId),

    /// Persisted embeddings were produced by a different encoder.
    #[error("semantic cache was built with encoder {found}, expected {expected}")]
    EncoderMismatch { expected: String, found: String },

    #[error("semantic cache is inconsistent: {0}")]
    CorruptCache(String),

    #[error("encoder failure: {0}")]
    Encoder(String),

    #[error("corpus error: {0}")]
    Corpus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    /// True when a rebuild is the expected remedy.
    pub fn is_stale_cache(&self) -> bool {
        matches!(
            self,
            SearchError::CacheMissing { .. }
                | SearchError::EncoderMismatch { .. }
                | SearchError::CorruptCache(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
