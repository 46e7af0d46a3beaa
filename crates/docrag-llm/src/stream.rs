use std::pin::Pin;
use std::task::{Context, Poll};

use docrag_core::{RagError, RagResult};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events emitted by a backend while it streams a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A piece of generated text.
    TextDelta {
        /// The piece, exactly as received.
        text: String,
    },

    /// The backend finished; no more events follow.
    Done,

    /// The backend failed mid-stream.
    Error {
        /// Backend-supplied reason.
        message: String,
    },
}

/// A lazy, finite, non-restartable sequence of generated text pieces.
///
/// Yields `Ok(text)` for every delta and ends (`None`) after the backend's
/// terminal [`StreamEvent::Done`]. A backend failure is yielded once as an
/// error and also ends the stream. Dropping the stream, or calling
/// [`GenerationStream::cancel`], stops the producing task.
pub struct GenerationStream {
    rx: mpsc::Receiver<StreamEvent>,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl GenerationStream {
    /// Wrap a receiver fed by `task`.
    pub fn new(rx: mpsc::Receiver<StreamEvent>, task: JoinHandle<()>) -> Self {
        Self {
            rx,
            task: Some(task),
            finished: false,
        }
    }

    /// Wrap a receiver whose producer is not a spawned task (mocks, adapters).
    pub fn from_receiver(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            rx,
            task: None,
            finished: false,
        }
    }

    /// A stream that yields `pieces` and then ends.
    pub fn from_pieces<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let events: Vec<StreamEvent> = pieces
            .into_iter()
            .map(|p| StreamEvent::TextDelta { text: p.into() })
            .chain(std::iter::once(StreamEvent::Done))
            .collect();
        let (tx, rx) = mpsc::channel(events.len());
        for event in events {
            // Capacity equals the number of events
            let _ = tx.try_send(event);
        }
        Self::from_receiver(rx)
    }

    /// Next text piece, `None` once the stream has ended.
    pub async fn next_text(&mut self) -> Option<RagResult<String>> {
        self.next().await
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> RagResult<String> {
        let mut out = String::new();
        while let Some(piece) = self.next().await {
            out.push_str(&piece?);
        }
        Ok(out)
    }

    /// Whether the terminal signal (or a failure) has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stop the producer and discard whatever it has not delivered yet.
    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.finished = true;
        self.rx.close();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Stream for GenerationStream {
    type Item = RagResult<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(StreamEvent::TextDelta { text })) => Poll::Ready(Some(Ok(text))),
            Poll::Ready(Some(StreamEvent::Done)) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Error { message })) => {
                self.finished = true;
                Poll::Ready(Some(Err(RagError::GenerationConnection(message))))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(Err(RagError::GenerationConnection(
                    "generation stream closed before completion".to_string(),
                ))))
            }
        }
    }
}

impl Drop for GenerationStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for GenerationStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
