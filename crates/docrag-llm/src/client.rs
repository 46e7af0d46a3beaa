use std::sync::Arc;

use crate::backends::ollama::OllamaBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::GenerationBackend;
use crate::config::{GenerationConfig, GenerationProvider};
use crate::stream::GenerationStream;
use docrag_core::RagResult;
use tracing::debug;

/// Output of a generation call: the whole text, or a lazy stream of pieces.
#[derive(Debug)]
pub enum Generation {
    /// Complete answer text.
    Text(String),
    /// Pieces as the backend produces them.
    Stream(GenerationStream),
}

impl Generation {
    /// Resolve to the full text, draining the stream if there is one.
    pub async fn into_text(self) -> RagResult<String> {
        match self {
            Generation::Text(text) => Ok(text),
            Generation::Stream(stream) => stream.collect_text().await,
        }
    }
}

/// Generation client that dispatches to the configured provider backend.
///
/// Cheap to clone; clones share the backend and its HTTP connection pool.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
}

impl GenerationClient {
    /// Build the backend `config.provider` names.
    pub fn new(config: GenerationConfig) -> RagResult<Self> {
        let backend: Arc<dyn GenerationBackend> = match config.provider {
            GenerationProvider::Ollama => Arc::new(OllamaBackend::new(config)?),
            GenerationProvider::OpenAi => Arc::new(OpenAiBackend::new(config)?),
        };
        Ok(Self { backend })
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Produce an answer for an already-assembled prompt.
    ///
    /// With `stream` set, returns once the server has accepted the request;
    /// connection failures surface either here or as the stream's last item.
    pub async fn generate(&self, prompt: &str, stream: bool) -> RagResult<Generation> {
        debug!(model = %self.backend.model(), stream, prompt_chars = prompt.chars().count(), "Generating");
        if stream {
            Ok(Generation::Stream(self.backend.generate_stream(prompt).await?))
        } else {
            Ok(Generation::Text(self.backend.generate(prompt).await?))
        }
    }

    /// Whether the backend answers a cheap request within its health timeout.
    pub async fn health(&self) -> bool {
        self.backend.health().await
    }

    /// Model name of the backend.
    pub fn model(&self) -> &str {
        self.backend.model()
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("model", &self.backend.model())
            .finish()
    }
}
