//! Core types and error definitions for the docrag retrieval engine.
//!
//! This crate provides the foundational types shared across all docrag crates:
//! the error taxonomy, the fragment data model, and structured metadata filters.
//!
//! # Main types
//!
//! - [`RagError`]: Unified error enum distinguishing configuration, ingestion,
//!   retrieval, and generation-connection failures.
//! - [`RagResult`]: Convenience alias for `Result<T, RagError>`.
//! - [`Fragment`]: A bounded piece of an ingested document plus its metadata.
//! - [`IndexedFragment`]: A fragment as stored in a vector index.
//! - [`MatchResult`]: A fragment returned by similarity search, with its distance.
//! - [`MetadataFilter`]: Equality constraints applied before distance computation.

/// Fragment data model and id derivation.
pub mod fragment;
/// Structured metadata predicates.
pub mod filter;

pub use filter::{FieldEquals, MetadataFilter};
pub use fragment::{
    fragment_id, Fragment, IndexStats, IndexedFragment, IngestionReport, MatchResult,
};

// --- Error types ---

/// Top-level error type for docrag.
///
/// The first four variants are the kinds callers are expected to react to
/// differently; the rest wrap lower-level failures.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Invalid settings: chunk size/overlap, embedding dimension mismatch, bad filters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A document could not be ingested. The index is left unchanged.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// Context retrieval failed (usually the query could not be embedded).
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// The generation backend is unreachable or answered with a non-2xx status.
    #[error("Generation backend connection error: {0}")]
    GenerationConnection(String),

    /// The embedding provider failed. The index wraps this into
    /// [`RagError::Ingestion`] and the retriever into [`RagError::Retrieval`].
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The persisted index could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Whether this error means the generation backend could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, RagError::GenerationConnection(_))
    }

    /// Whether this error is a fatal configuration problem.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RagError::Configuration(_))
    }
}

/// A convenience `Result` alias using [`RagError`].
pub type RagResult<T> = Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagError::Configuration("chunk_size must be positive".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk_size must be positive"
        );
        let err = RagError::GenerationConnection("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_error_kind_helpers() {
        assert!(RagError::GenerationConnection("x".into()).is_connection());
        assert!(!RagError::Retrieval("x".into()).is_connection());
        assert!(RagError::Configuration("x".into()).is_configuration());
        assert!(!RagError::Ingestion("x".into()).is_configuration());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RagError = io.into();
        assert!(matches!(err, RagError::Io(_)));
    }
}
