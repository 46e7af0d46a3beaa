use super::{
    build_http_client, connection_error, ensure_success, send_with_timeout, spawn_line_stream,
    GenerationBackend, LineEvent,
};
use crate::config::GenerationConfig;
use crate::stream::GenerationStream;
use async_trait::async_trait;
use docrag_core::{RagError, RagResult};
use tracing::{debug, warn};

const PROVIDER: &str = "Ollama";

/// Ollama `/api/generate` backend.
///
/// Non-streaming calls read a single JSON object; streaming calls read
/// newline-delimited JSON objects until one carries `"done": true`.
pub struct OllamaBackend {
    config: GenerationConfig,
    http: reqwest::Client,
}

impl OllamaBackend {
    /// Backend for `config`, with its own connection pool.
    pub fn new(config: GenerationConfig) -> RagResult<Self> {
        let http = build_http_client(config.health_timeout())?;
        Ok(Self { config, http })
    }

    fn build_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": stream,
            "options": {
                "temperature": self.config.temperature,
                "top_p": self.config.top_p,
                "num_ctx": self.config.num_ctx,
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.resolved_base_url())
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let resp = self
            .http
            .post(self.url("/api/generate"))
            .timeout(self.config.timeout())
            .json(&self.build_body(prompt, false))
            .send()
            .await
            .map_err(|e| connection_error(PROVIDER, e))?;
        let resp = ensure_success(PROVIDER, resp).await?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| connection_error(PROVIDER, e))?;
        parse_ollama_response(&body)
    }

    async fn generate_stream(&self, prompt: &str) -> RagResult<GenerationStream> {
        let request = self
            .http
            .post(self.url("/api/generate"))
            .json(&self.build_body(prompt, true));
        let resp = send_with_timeout(PROVIDER, self.config.timeout(), request.send()).await?;
        let resp = ensure_success(PROVIDER, resp).await?;

        debug!(model = %self.config.model, "Ollama stream started");
        Ok(spawn_line_stream(PROVIDER, resp, parse_ollama_line))
    }

    async fn health(&self) -> bool {
        let result = self
            .http
            .get(self.url("/api/tags"))
            .timeout(self.config.health_timeout())
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Extract the answer from a non-streaming `/api/generate` body.
pub fn parse_ollama_response(body: &serde_json::Value) -> RagResult<String> {
    if let Some(err) = body["error"].as_str() {
        return Err(RagError::GenerationConnection(format!("Ollama error: {err}")));
    }
    body["response"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::GenerationConnection("Ollama response has no `response` field".to_string())
        })
}

pub(crate) fn parse_ollama_line(line: &str) -> LineEvent {
    if line.is_empty() {
        return LineEvent::Skip;
    }
    let event: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return LineEvent::Skip,
    };
    if let Some(err) = event["error"].as_str() {
        return LineEvent::Error(format!("Ollama error: {err}"));
    }
    let text = event["response"].as_str().unwrap_or_default().to_string();
    if event["done"].as_bool().unwrap_or(false) {
        LineEvent::Done(Some(text))
    } else {
        LineEvent::Text(text)
    }
}
