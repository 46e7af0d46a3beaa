//! Chunking, embeddings, vector indexing and retrieval for docrag.
//!
//! Provides the ingestion-side building blocks (chunker, embedding
//! providers, vector index) and the query-side retriever.
//!
//! # Main types
//!
//! - [`Chunker`]: Recursive, overlap-preserving text splitter.
//! - [`EmbeddingProvider`]: Trait for turning text into fixed-length vectors.
//! - [`LocalEmbedding`]: Local hashed bag-of-words embedding provider.
//! - [`VectorIndex`]: Trait for storing and searching embedded fragments.
//! - [`InMemoryVectorIndex`] / [`FileVectorIndex`]: Volatile and JSONL-backed indexes.
//! - [`Retriever`]: Embeds a question and returns ranked context.

/// Recursive text chunker.
pub mod chunker;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// HTTP embedding provider (Ollama).
#[cfg(feature = "http-embeddings")]
pub mod http_embedding;
/// Question → ranked context.
pub mod retriever;
/// Vector index trait and implementations.
pub mod store;

pub use chunker::Chunker;
pub use embedding::{EmbeddingProvider, LocalEmbedding};
#[cfg(feature = "http-embeddings")]
pub use http_embedding::OllamaEmbedding;
pub use retriever::Retriever;
pub use store::{cosine_distance, FileVectorIndex, InMemoryVectorIndex, VectorIndex};
