/// Ollama `/api/generate`.
pub mod ollama;
/// OpenAI-compatible chat completions.
pub mod openai;

use std::future::Future;
use std::time::Duration;

use crate::stream::{GenerationStream, StreamEvent};
use async_trait::async_trait;
use docrag_core::{RagError, RagResult};
use futures_util::StreamExt;
use tokio::sync::mpsc;

/// Trait for text-generation backends.
///
/// Each provider (Ollama, OpenAI-compatible) implements this trait to handle
/// API communication. [`crate::GenerationClient`] dispatches to one of them.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `GenerationBackend` for your struct
/// 3. Add the variant to `GenerationProvider` in `config.rs`
/// 4. Wire it up in `GenerationClient::new()` in `client.rs`
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce the whole completion for `prompt`.
    async fn generate(&self, prompt: &str) -> RagResult<String>;

    /// Start a streamed completion. Fails before returning if the server
    /// cannot be reached or rejects the request.
    async fn generate_stream(&self, prompt: &str) -> RagResult<GenerationStream>;

    /// Whether the backend is reachable and serving. Never errors.
    async fn health(&self) -> bool;

    /// Model identifier sent with every request.
    fn model(&self) -> &str;
}

/// What a single line of a streamed response body means.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LineEvent {
    Text(String),
    /// Text carried by the terminal line itself, possibly empty.
    Done(Option<String>),
    Error(String),
    Skip,
}

pub(crate) fn build_http_client(connect_timeout: Duration) -> RagResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| RagError::Configuration(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn connection_error(provider: &str, e: reqwest::Error) -> RagError {
    if e.is_timeout() {
        RagError::GenerationConnection(format!("{provider} request timed out: {e}"))
    } else {
        RagError::GenerationConnection(format!("{provider} request failed: {e}"))
    }
}

/// Await `send` with an upper bound on how long the response headers may take.
pub(crate) async fn send_with_timeout<F>(
    provider: &str,
    timeout: Duration,
    send: F,
) -> RagResult<reqwest::Response>
where
    F: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    match tokio::time::timeout(timeout, send).await {
        Ok(result) => result.map_err(|e| connection_error(provider, e)),
        Err(_) => Err(RagError::GenerationConnection(format!(
            "{provider} did not respond within {}s",
            timeout.as_secs()
        ))),
    }
}

/// Turn a non-2xx response into a connection error carrying the body.
pub(crate) async fn ensure_success(
    provider: &str,
    resp: reqwest::Response,
) -> RagResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let error_body = resp
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(RagError::GenerationConnection(format!(
        "{provider} API error {status}: {error_body}"
    )))
}

/// Pump a line-delimited response body through `parse` on a background task.
///
/// Lines are split on raw bytes so multi-byte characters that straddle
/// network chunks stay intact. The task stops after the first terminal
/// event, or when the returned stream is dropped.
pub(crate) fn spawn_line_stream<P>(
    provider: &'static str,
    resp: reqwest::Response,
    parse: P,
) -> GenerationStream
where
    P: Fn(&str) -> LineEvent + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<StreamEvent>(256);
    let mut body = resp.bytes_stream();

    let handle = tokio::spawn(async move {
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk_result) = body.next().await {
            let chunk = match chunk_result {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            message: format!("{provider} stream read error: {e}"),
                        })
                        .await;
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = String::from_utf8_lossy(&raw);
                if !forward(&tx, parse(line.trim())).await {
                    return;
                }
            }
        }

        // Trailing line without a newline
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if !forward(&tx, parse(line.trim())).await {
                return;
            }
        }

        let _ = tx
            .send(StreamEvent::Error {
                message: format!("{provider} stream ended without a completion signal"),
            })
            .await;
    });

    GenerationStream::new(rx, handle)
}

/// Send the events for one parsed line. Returns false once the stream is over.
async fn forward(tx: &mpsc::Sender<StreamEvent>, event: LineEvent) -> bool {
    match event {
        LineEvent::Skip => true,
        LineEvent::Text(text) => {
            if text.is_empty() {
                return true;
            }
            tx.send(StreamEvent::TextDelta { text }).await.is_ok()
        }
        LineEvent::Done(tail) => {
            if let Some(text) = tail.filter(|t| !t.is_empty()) {
                let _ = tx.send(StreamEvent::TextDelta { text }).await;
            }
            let _ = tx.send(StreamEvent::Done).await;
            false
        }
        LineEvent::Error(message) => {
            let _ = tx.send(StreamEvent::Error { message }).await;
            false
        }
    }
}
