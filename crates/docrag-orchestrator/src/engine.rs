use crate::config::EngineConfig;
use crate::loader::load_document;
use docrag_core::{Fragment, IngestionReport, MatchResult, RagError, RagResult};
use docrag_llm::{Generation, GenerationClient, GenerationStream, PromptAssembler};
use docrag_memory::{Chunker, EmbeddingProvider, FileVectorIndex, Retriever, VectorIndex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Answer returned when retrieval finds nothing; no generation call is made.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No documents have been ingested yet. Please ingest a document first!";

/// A question plus how to answer it.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The user's question.
    pub question: String,
    /// Restrict retrieval to one source.
    pub source_filter: Option<String>,
    /// Overrides the engine's default result cap.
    pub max_results: Option<usize>,
    /// Return the answer as a [`GenerationStream`].
    pub stream: bool,
}

impl QueryRequest {
    /// Ask `question` with the engine's defaults.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            source_filter: None,
            max_results: None,
            stream: false,
        }
    }

    /// Restrict retrieval to `source`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_filter = Some(source.into());
        self
    }

    /// Use at most `max_results` fragments as context.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    /// Ask for a streamed answer.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// The generated answer, whole or streamed.
#[derive(Debug)]
pub enum Answer {
    /// The full answer text.
    Complete(String),
    /// Answer pieces in generation order.
    Streaming(GenerationStream),
}

impl Answer {
    /// The full answer text, draining the stream if necessary.
    pub async fn into_text(self) -> RagResult<String> {
        match self {
            Answer::Complete(text) => Ok(text),
            Answer::Streaming(stream) => stream.collect_text().await,
        }
    }
}

/// Answer plus the fragments it was grounded on, nearest first.
#[derive(Debug)]
pub struct QueryResponse {
    /// The generated answer.
    pub answer: Answer,
    /// Retrieved context, nearest first.
    pub sources: Vec<MatchResult>,
}

/// Engine-wide status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Fragments in the index.
    pub total_fragments: usize,
    /// Length of every stored vector.
    pub embedding_dimension: usize,
    /// Embedding provider's model name.
    pub embedding_model: String,
    /// Generation backend's model name.
    pub generation_model: String,
    /// Whether the generation backend answered its health check.
    pub generation_healthy: bool,
}

/// The retrieval-augmented generation engine.
///
/// Ingestion runs Chunker → VectorIndex; queries run
/// Retriever → PromptAssembler → GenerationClient. All collaborators are
/// passed in at construction; the engine keeps no fragment state itself.
pub struct RagEngine {
    chunker: Chunker,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: GenerationClient,
}

impl RagEngine {
    /// Wire an engine from pre-built parts.
    ///
    /// Fails with [`RagError::Configuration`] if the index and the embedding
    /// provider disagree on the vector dimension.
    pub fn new(
        chunker: Chunker,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: GenerationClient,
    ) -> RagResult<Self> {
        if index.dimension() != embedder.dimension() {
            return Err(RagError::Configuration(format!(
                "index dimension {} does not match embedding dimension {}",
                index.dimension(),
                embedder.dimension()
            )));
        }
        let retriever = Retriever::new(index.clone(), embedder.clone());
        Ok(Self {
            chunker,
            index,
            embedder,
            retriever,
            assembler: PromptAssembler::default(),
            generator,
        })
    }

    /// Build every collaborator from `config`, opening the JSONL index
    /// under `data_dir`.
    pub async fn from_config(config: &EngineConfig) -> RagResult<Self> {
        config.validate()?;
        let embedder = config.embedding.build()?;
        let index: Arc<dyn VectorIndex> =
            Arc::new(FileVectorIndex::open(config.index_path(), embedder.clone()).await?);
        let generator = GenerationClient::new(config.generation.clone())?;

        info!(
            index = %config.index_path().display(),
            embedding_model = %embedder.model_name(),
            generation_model = %generator.model(),
            "RAG engine initialized"
        );

        Ok(Self::new(config.chunking.chunker()?, index, embedder, generator)?
            .with_max_results(config.retrieval.max_results))
    }

    /// Default result cap for queries that do not set one. Chainable.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.retriever = self.retriever.with_max_results(max_results);
        self
    }

    /// Replace the prompt assembler. Chainable.
    pub fn with_prompt_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Chunk `content`, tag every chunk with `source_name` and its position,
    /// and store the batch.
    ///
    /// Text with no non-whitespace content yields a report with zero chunks
    /// and leaves the index untouched.
    pub async fn ingest(&self, content: &str, source_name: &str) -> RagResult<IngestionReport> {
        self.ingest_with_metadata(content, source_name, BTreeMap::new())
            .await
    }

    /// [`RagEngine::ingest`] with extra metadata copied onto every fragment.
    pub async fn ingest_with_metadata(
        &self,
        content: &str,
        source_name: &str,
        extra_metadata: BTreeMap<String, String>,
    ) -> RagResult<IngestionReport> {
        let start = Instant::now();
        let result = self
            .ingest_inner(content, source_name, &extra_metadata)
            .await;

        match &result {
            Ok(report) => info!(
                source = %report.source,
                chunks = report.chunks_created,
                stored = report.chunks_stored,
                duration_ms = start.elapsed().as_millis() as u64,
                "Document ingested"
            ),
            Err(e) => error!(source = %source_name, error = %e, "Ingestion failed"),
        }
        result
    }

    async fn ingest_inner(
        &self,
        content: &str,
        source_name: &str,
        extra_metadata: &BTreeMap<String, String>,
    ) -> RagResult<IngestionReport> {
        if source_name.trim().is_empty() {
            return Err(RagError::Ingestion("source name must not be empty".to_string()));
        }

        let chunks = self.chunker.split(content);
        if chunks.is_empty() {
            warn!(source = %source_name, "Document has no text, nothing stored");
            return Ok(IngestionReport {
                source: source_name.to_string(),
                chunks_created: 0,
                chunks_stored: 0,
            });
        }

        let fragments = Fragment::batch(source_name, chunks, extra_metadata);
        let chunks_created = fragments.len();
        debug!(source = %source_name, chunks = chunks_created, "Document chunked");

        let chunks_stored = self.index.add(fragments).await?;
        Ok(IngestionReport {
            source: source_name.to_string(),
            chunks_created,
            chunks_stored,
        })
    }

    /// Read a `.txt`/`.md` file and ingest it under its file name, tagged
    /// with `file_path` and `file_type`.
    pub async fn ingest_file(&self, path: &Path) -> RagResult<IngestionReport> {
        let document = load_document(path).await.inspect_err(|e| {
            error!(path = %path.display(), error = %e, "Cannot load document");
        })?;
        self.ingest_with_metadata(&document.content, &document.source, document.metadata)
            .await
    }

    /// Answer a question from the indexed documents.
    ///
    /// If retrieval comes back empty the answer is [`NO_DOCUMENTS_ANSWER`],
    /// the sources are empty and the generation backend is not called.
    pub async fn query(&self, request: QueryRequest) -> RagResult<QueryResponse> {
        let max_results = request
            .max_results
            .unwrap_or_else(|| self.retriever.max_results());

        let sources = self
            .retriever
            .retrieve(
                &request.question,
                max_results,
                request.source_filter.as_deref(),
            )
            .await
            .inspect_err(|e| error!(error = %e, "Retrieval failed"))?;

        if sources.is_empty() {
            info!(
                source = request.source_filter.as_deref().unwrap_or("*"),
                "No context found, skipping generation"
            );
            return Ok(QueryResponse {
                answer: Answer::Complete(NO_DOCUMENTS_ANSWER.to_string()),
                sources,
            });
        }

        let context: Vec<&str> = sources.iter().map(|m| m.fragment.content.as_str()).collect();
        let prompt = self.assembler.build(&request.question, &context);

        let generation = self
            .generator
            .generate(&prompt, request.stream)
            .await
            .inspect_err(|e| {
                if e.is_connection() {
                    warn!(model = %self.generator.model(), error = %e, "Generation backend unreachable");
                } else {
                    error!(error = %e, "Generation failed");
                }
            })?;

        info!(
            results = sources.len(),
            k = max_results,
            stream = request.stream,
            "Query answered"
        );

        let answer = match generation {
            Generation::Text(text) => Answer::Complete(text),
            Generation::Stream(stream) => Answer::Streaming(stream),
        };
        Ok(QueryResponse { answer, sources })
    }

    /// Remove every fragment of `source`. Returns how many were removed.
    pub async fn delete_document(&self, source: &str) -> RagResult<usize> {
        let removed = self
            .index
            .delete_by_source(source)
            .await
            .inspect_err(|e| error!(source = %source, error = %e, "Delete failed"))?;
        info!(source = %source, removed, "Document deleted");
        Ok(removed)
    }

    /// Sorted, deduplicated names of every ingested source.
    pub async fn list_sources(&self) -> RagResult<Vec<String>> {
        self.index.sources().await
    }

    /// Remove every fragment of every source.
    pub async fn clear_all(&self) -> RagResult<()> {
        self.index
            .clear()
            .await
            .inspect_err(|e| error!(error = %e, "Clear failed"))?;
        warn!("All documents cleared");
        Ok(())
    }

    /// Index size plus model names and backend health.
    pub async fn stats(&self) -> RagResult<EngineStats> {
        let index_stats = self.index.stats().await?;
        let generation_healthy = self.generator.health().await;
        Ok(EngineStats {
            total_fragments: index_stats.total_fragments,
            embedding_dimension: index_stats.embedding_dimension,
            embedding_model: self.embedder.model_name().to_string(),
            generation_model: self.generator.model().to_string(),
            generation_healthy,
        })
    }

    /// Whether the generation backend is reachable.
    pub async fn health(&self) -> bool {
        self.generator.health().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrag_llm::GenerationBackend;
    use docrag_memory::retriever::DEFAULT_MAX_RESULTS;
    use docrag_memory::{InMemoryVectorIndex, LocalEmbedding};

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn generate(&self, prompt: &str) -> RagResult<String> {
            Ok(format!("echo:{}", prompt.len()))
        }

        async fn generate_stream(&self, _prompt: &str) -> RagResult<GenerationStream> {
            Ok(GenerationStream::from_pieces(["e", "cho"]))
        }

        async fn health(&self) -> bool {
            true
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn engine(dimension: usize) -> RagResult<RagEngine> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LocalEmbedding::new(64));
        let index = Arc::new(InMemoryVectorIndex::new(Arc::new(LocalEmbedding::new(dimension))));
        RagEngine::new(
            Chunker::default(),
            index,
            embedder,
            GenerationClient::from_backend(Arc::new(EchoBackend)),
        )
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        assert!(engine(32).err().unwrap().is_configuration());
        assert!(engine(64).is_ok());
    }

    #[tokio::test]
    async fn test_empty_source_name_rejected() {
        let engine = engine(64).unwrap();
        let err = engine.ingest("some text here", "  ").await.unwrap_err();
        assert!(matches!(err, RagError::Ingestion(_)));
        assert!(engine.list_sources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_document_stores_nothing() {
        let engine = engine(64).unwrap();
        engine.ingest("kept text", "kept.txt").await.unwrap();

        for blank in ["", "  \n\n "] {
            let report = engine.ingest(blank, "blank.txt").await.unwrap();
            assert_eq!(report.source, "blank.txt");
            assert_eq!(report.chunks_created, 0);
            assert_eq!(report.chunks_stored, 0);
        }
        assert_eq!(engine.list_sources().await.unwrap(), vec!["kept.txt".to_string()]);
        assert_eq!(engine.stats().await.unwrap().total_fragments, 1);
    }

    #[tokio::test]
    async fn test_default_max_results_applies() {
        let engine = engine(64).unwrap().with_max_results(1);
        let text = "alpha beta gamma. ".repeat(100);
        engine.ingest(&text, "a.txt").await.unwrap();
        let response = engine.query(QueryRequest::new("alpha beta")).await.unwrap();
        assert_eq!(response.sources.len(), 1);
        assert!(matches!(response.answer, Answer::Complete(ref t) if t.starts_with("echo:")));
    }

    #[test]
    fn test_query_request_builder() {
        let request = QueryRequest::new("q").with_source("a.md").with_max_results(2).streaming();
        assert_eq!(request.source_filter.as_deref(), Some("a.md"));
        assert_eq!(request.max_results, Some(2));
        assert!(request.stream);
        assert_eq!(DEFAULT_MAX_RESULTS, 5);
    }
}
