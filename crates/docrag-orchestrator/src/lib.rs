//! Retrieval-augmented generation engine for docrag.
//!
//! Composes the chunker and vector index (ingestion path) with the
//! retriever, prompt assembler and generation client (query path).
//!
//! # Main types
//!
//! - [`RagEngine`]: Public surface: ingest, query, delete, list, stats, clear.
//! - [`EngineConfig`]: TOML-backed configuration for every collaborator.
//! - [`QueryRequest`] / [`QueryResponse`]: Query input and grounded answer.

/// Engine configuration.
pub mod config;
/// The RAG engine.
pub mod engine;
/// Plain-text document loading.
pub mod loader;

pub use config::{
    ChunkingConfig, EmbeddingConfig, EmbeddingProviderKind, EngineConfig, RetrievalConfig,
    API_KEY_ENV,
};
pub use engine::{Answer, EngineStats, QueryRequest, QueryResponse, RagEngine, NO_DOCUMENTS_ANSWER};
pub use loader::{load_document, LoadedDocument};
