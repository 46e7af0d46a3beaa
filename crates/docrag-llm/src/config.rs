use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which generation API a [`GenerationConfig`] talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Local Ollama server (`/api/generate`).
    #[default]
    Ollama,
    /// Any OpenAI-compatible chat completions API (OpenAI, Groq, vLLM, LM Studio...).
    OpenAi,
}

/// Settings for the text-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API flavour.
    #[serde(default)]
    pub provider: GenerationProvider,
    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Server URL; `None` uses the provider's default.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer token for OpenAI-compatible APIs.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Context window requested from Ollama.
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    /// Completion cap sent to OpenAI-compatible APIs.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Bound on a full non-streaming request, and on the wait for stream headers.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bound on connecting, and on the whole health check.
    #[serde(default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_num_ctx() -> u32 {
    2048
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_health_timeout_secs() -> u64 {
    5
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::default(),
            model: default_model(),
            base_url: None,
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            num_ctx: default_num_ctx(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            health_timeout_secs: default_health_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    /// The configured base URL, or the provider's well-known default.
    /// Never ends with a slash.
    pub fn resolved_base_url(&self) -> &str {
        let url = match &self.base_url {
            Some(url) => url.as_str(),
            None => match self.provider {
                GenerationProvider::Ollama => "http://localhost:11434",
                GenerationProvider::OpenAi => "https://api.openai.com",
            },
        };
        url.trim_end_matches('/')
    }

    /// [`GenerationConfig::timeout_secs`] as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// [`GenerationConfig::health_timeout_secs`] as a duration.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}
