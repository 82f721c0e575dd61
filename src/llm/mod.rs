//! Language-model backends.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

mod gemini;
mod ollama;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend label used in logs.
    fn name(&self) -> &str;

    /// Sends one prompt and returns the model's text answer.
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    /// Fully composed prompt.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the answer.
    pub max_tokens: usize,
}

/// Supported backends, selected with `LLM_TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LlmBackend {
    /// Google Gemini `generateContent` API.
    Gemini,
    /// Local Ollama server.
    Ollama,
}

/// Connection settings for whichever backend is selected.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Selected backend.
    pub backend: LlmBackend,
    /// Gemini API key (`GOOGLE_API_KEY`).
    pub google_api_key: Option<String>,
    /// Gemini model id.
    pub gemini_model: String,
    /// Gemini API base URL.
    pub gemini_base_url: String,
    /// Ollama server URL.
    pub ollama_base_url: String,
    /// Ollama model tag.
    pub ollama_model: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

/// Builds the configured provider.
pub fn build_provider(settings: &LlmSettings) -> crate::error::AppResult<Arc<dyn LlmProvider>> {
    use crate::error::AppError;

    let timeout = std::time::Duration::from_secs(settings.timeout_secs.max(1));
    let provider: Arc<dyn LlmProvider> = match settings.backend {
        LlmBackend::Gemini => {
            let key = settings
                .google_api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    AppError::Config("GOOGLE_API_KEY must be set for the Gemini backend".into())
                })?;
            Arc::new(
                GeminiProvider::new(
                    key,
                    settings.gemini_model.clone(),
                    &settings.gemini_base_url,
                    timeout,
                )
                .map_err(|err| AppError::Config(format!("{err:#}")))?,
            )
        }
        LlmBackend::Ollama => Arc::new(
            OllamaProvider::new(
                settings.ollama_model.clone(),
                &settings.ollama_base_url,
                timeout,
            )
            .map_err(|err| AppError::Config(format!("{err:#}")))?,
        ),
    };
    tracing::info!(backend = provider.name(), "language model configured");
    Ok(provider)
}
