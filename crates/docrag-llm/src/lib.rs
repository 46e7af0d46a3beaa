//! Generation backends, streaming and prompt assembly for docrag.

/// Provider-specific HTTP backends.
pub mod backends;
/// Provider-agnostic generation client.
pub mod client;
/// Generation settings.
pub mod config;
/// Grounded prompt assembly.
pub mod prompt;
/// Streaming answer types.
pub mod stream;

pub use backends::GenerationBackend;
pub use client::{Generation, GenerationClient};
pub use config::{GenerationConfig, GenerationProvider};
pub use prompt::{PromptAssembler, UNAVAILABLE_ANSWER};
pub use stream::{GenerationStream, StreamEvent};
