use super::{
    build_http_client, connection_error, ensure_success, send_with_timeout, spawn_line_stream,
    GenerationBackend, LineEvent,
};
use crate::config::GenerationConfig;
use crate::stream::GenerationStream;
use async_trait::async_trait;
use docrag_core::{RagError, RagResult};
use tracing::{debug, warn};

const PROVIDER: &str = "OpenAI";

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, Groq, vLLM, LM Studio and any other provider
/// that implements the chat completions API. The prompt is sent as a
/// single user message.
pub struct OpenAiBackend {
    config: GenerationConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend for `config`, with its own connection pool.
    pub fn new(config: GenerationConfig) -> RagResult<Self> {
        let http = build_http_client(config.health_timeout())?;
        Ok(Self { config, http })
    }

    fn build_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "messages": [{"role": "user", "content": prompt}],
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    fn add_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.resolved_base_url())
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> RagResult<String> {
        let request = self
            .add_auth(self.http.post(self.url("/v1/chat/completions")))
            .timeout(self.config.timeout());

        let resp = request
            .json(&self.build_body(prompt, false))
            .send()
            .await
            .map_err(|e| connection_error(PROVIDER, e))?;
        let resp = ensure_success(PROVIDER, resp).await?;

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| connection_error(PROVIDER, e))?;
        parse_openai_response(&resp_body)
    }

    async fn generate_stream(&self, prompt: &str) -> RagResult<GenerationStream> {
        let request = self
            .add_auth(self.http.post(self.url("/v1/chat/completions")))
            .json(&self.build_body(prompt, true));
        let resp = send_with_timeout(PROVIDER, self.config.timeout(), request.send()).await?;
        let resp = ensure_success(PROVIDER, resp).await?;

        debug!(model = %self.config.model, "OpenAI stream started");
        Ok(spawn_line_stream(PROVIDER, resp, parse_sse_line))
    }

    async fn health(&self) -> bool {
        let result = self
            .add_auth(self.http.get(self.url("/v1/models")))
            .timeout(self.config.health_timeout())
            .send()
            .await;
        match result {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "OpenAI health check failed");
                false
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Extract the first choice's message content from a chat completion body.
pub fn parse_openai_response(body: &serde_json::Value) -> RagResult<String> {
    if let Some(message) = body["error"]["message"].as_str() {
        return Err(RagError::GenerationConnection(format!(
            "OpenAI error: {message}"
        )));
    }
    let choice = &body["choices"][0];
    if choice.is_null() {
        return Err(RagError::GenerationConnection(
            "OpenAI response has no choices".to_string(),
        ));
    }
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// One line of a server-sent-events body.
pub(crate) fn parse_sse_line(line: &str) -> LineEvent {
    if line.is_empty() || line.starts_with(':') {
        return LineEvent::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return LineEvent::Done(None);
    }

    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return LineEvent::Skip,
    };
    if let Some(message) = event["error"]["message"].as_str() {
        return LineEvent::Error(format!("OpenAI error: {message}"));
    }

    // finish_reason arrives before [DONE]; keep reading until the sentinel
    LineEvent::Text(
        event["choices"][0]["delta"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
    )
}
