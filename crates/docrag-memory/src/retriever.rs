use std::sync::Arc;

use docrag_core::{MatchResult, MetadataFilter, RagError, RagResult};
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::store::VectorIndex;

/// Default number of fragments handed to the prompt.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Turns a question into ranked context by embedding it and searching the index.
///
/// Results come back in the index's order (ascending distance) and are not
/// deduplicated by source.
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    max_results: usize,
}

impl Retriever {
    /// Create a retriever with the default result cap.
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Set the result cap used by [`Retriever::retrieve_default`]. Chainable.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// The configured result cap.
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Retrieve up to `max_results` fragments for `question`, optionally
    /// restricted to one source.
    ///
    /// A failure to embed the question is reported as [`RagError::Retrieval`]
    /// and no partial context is returned.
    pub async fn retrieve(
        &self,
        question: &str,
        max_results: usize,
        source_filter: Option<&str>,
    ) -> RagResult<Vec<MatchResult>> {
        let query_embedding = self.embedder.embed(question).await.map_err(|e| match e {
            RagError::Configuration(_) => e,
            other => RagError::Retrieval(format!("failed to embed question: {other}")),
        })?;

        let filter = source_filter.map(MetadataFilter::source);
        let results = self
            .index
            .search(&query_embedding, max_results, filter.as_ref())
            .await?;

        debug!(
            k = max_results,
            source = source_filter.unwrap_or("*"),
            results = results.len(),
            "Retrieved context"
        );
        Ok(results)
    }

    /// [`Retriever::retrieve`] with the configured result cap.
    pub async fn retrieve_default(
        &self,
        question: &str,
        source_filter: Option<&str>,
    ) -> RagResult<Vec<MatchResult>> {
        self.retrieve(question, self.max_results, source_filter).await
    }
}
