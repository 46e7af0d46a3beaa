use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use docrag_core::{RagError, RagResult};
use docrag_llm::GenerationConfig;
use docrag_memory::chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docrag_memory::embedding::DEFAULT_DIMENSION;
use docrag_memory::retriever::DEFAULT_MAX_RESULTS;
use docrag_memory::{Chunker, EmbeddingProvider, LocalEmbedding, OllamaEmbedding};
use serde::{Deserialize, Serialize};

/// Environment variable that supplies `generation.api_key` when the file omits it.
pub const API_KEY_ENV: &str = "DOCRAG_API_KEY";

/// File name of the persisted index inside `data_dir`.
pub const INDEX_FILE_NAME: &str = "index.jsonl";

/// Top-level engine configuration, usually read from `docrag.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding the index file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// `[chunking]` table.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// `[retrieval]` table.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// `[embedding]` table.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// `[generation]` table.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Chunk size and overlap, in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks; must be below `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

/// Query-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Fragments used as context when a query does not say.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

/// Which embedding provider to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// In-process hashed bag-of-words vectors. No server needed.
    #[default]
    Local,
    /// Ollama `/api/embed`.
    Ollama,
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider to build.
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    /// Vector length. Must match any index already on disk.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Ollama embedding model.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Ollama server URL.
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    /// Per-request bound for the Ollama provider.
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_dimension() -> usize {
    DEFAULT_DIMENSION
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimension: default_dimension(),
            model: default_embedding_model(),
            base_url: default_embedding_base_url(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl ChunkingConfig {
    /// Build the chunker these settings describe.
    pub fn chunker(&self) -> RagResult<Chunker> {
        Chunker::new(self.chunk_size, self.chunk_overlap)
    }
}

impl EmbeddingConfig {
    /// Build the configured embedding provider.
    pub fn build(&self) -> RagResult<Arc<dyn EmbeddingProvider>> {
        if self.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        Ok(match self.provider {
            EmbeddingProviderKind::Local => Arc::new(LocalEmbedding::new(self.dimension)),
            EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbedding::new(
                &self.base_url,
                &self.model,
                self.dimension,
                Duration::from_secs(self.timeout_secs),
            )?),
        })
    }
}

impl EngineConfig {
    /// Parse a TOML document. Every field is optional.
    pub fn from_toml_str(content: &str) -> RagResult<Self> {
        toml::from_str(content)
            .map_err(|e| RagError::Configuration(format!("invalid config: {e}")))
    }

    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> RagResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(RagError::Configuration(format!(
                "cannot read config {}: {e}",
                path.display()
            ))),
        }
    }

    /// Fill a missing generation API key from `value` (normally `$DOCRAG_API_KEY`).
    pub fn with_fallback_api_key(mut self, value: Option<String>) -> Self {
        if self.generation.api_key.is_none() {
            self.generation.api_key = value.filter(|v| !v.is_empty());
        }
        self
    }

    /// Check cross-field constraints before anything is built.
    pub fn validate(&self) -> RagResult<()> {
        self.chunking.chunker()?;
        if self.retrieval.max_results == 0 {
            return Err(RagError::Configuration(
                "retrieval.max_results must be positive".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding.dimension must be positive".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(RagError::Configuration(
                "generation.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Where the persisted index lives.
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(INDEX_FILE_NAME)
    }
}
