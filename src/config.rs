//! Command-line and environment configuration shared by the binaries.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::compression::CompressionConfig;
use crate::embedder::{Embedder, HashingEmbedder, OpenAiEmbedder};
use crate::error::{AppError, AppResult};
use crate::llm::{LlmBackend, LlmSettings};
use crate::orchestrator::AgentSettings;
use crate::speech::{FfmpegConverter, OpenAiSynthesizer, OpenAiTranscriber, SpeechServices};
use crate::splitter::{WindowSplitter, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

/// Installs the global `tracing` subscriber; `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Loads `.env` from the working directory when present.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
}

/// Credentials and endpoint for OpenAI-compatible services.
#[derive(Args, Debug, Clone)]
pub struct OpenAiArgs {
    /// OpenAI API key used for embeddings and audio.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Seconds before OpenAI requests time out.
    #[arg(long, env = "OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    pub openai_timeout_secs: u64,
}

impl OpenAiArgs {
    fn api_key(&self, purpose: &str) -> AppResult<&str> {
        self.openai_api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Config(format!("OPENAI_API_KEY must be set for {purpose}")))
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout_secs.max(1))
    }
}

/// Embedding backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderBackend {
    /// OpenAI-compatible `/embeddings` API.
    Openai,
    /// Offline feature hashing, useful for local runs and tests.
    Hashing,
}

/// Embedder selection.
#[derive(Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Embedding backend.
    #[arg(long, env = "EMBEDDER", value_enum, ignore_case = true, default_value = "openai")]
    pub embedder: EmbedderBackend,

    /// Embedding model identifier.
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Max inputs per embedding request.
    #[arg(long, env = "EMBEDDING_BATCH", default_value_t = 32)]
    pub embedding_batch_size: usize,

    /// Vector width of the hashing embedder.
    #[arg(long, env = "HASHING_DIMENSIONS", default_value_t = 512)]
    pub hashing_dimensions: usize,
}

impl EmbedderArgs {
    /// Builds the configured embedder.
    pub fn build(&self, openai: &OpenAiArgs) -> AppResult<Arc<dyn Embedder>> {
        let embedder: Arc<dyn Embedder> = match self.embedder {
            EmbedderBackend::Openai => Arc::new(
                OpenAiEmbedder::new(
                    openai.api_key("OpenAI embeddings")?,
                    &openai.openai_base_url,
                    self.embedding_model.clone(),
                    self.embedding_dimensions,
                    openai.timeout(),
                    self.embedding_batch_size,
                )
                .map_err(|err| AppError::Config(format!("{err:#}")))?,
            ),
            EmbedderBackend::Hashing => {
                if self.hashing_dimensions == 0 {
                    return Err(AppError::Config("hashing dimensions must be positive".into()));
                }
                Arc::new(
                    HashingEmbedder::new(self.hashing_dimensions)
                        .with_batch_size(self.embedding_batch_size),
                )
            }
        };
        tracing::info!(embedder = %embedder.id(), "embedder configured");
        Ok(embedder)
    }
}

/// Chunking knobs for index builds.
#[derive(Args, Debug, Clone)]
pub struct ChunkArgs {
    /// Characters per chunk.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,
}

impl ChunkArgs {
    /// Validated splitter.
    pub fn splitter(&self) -> AppResult<WindowSplitter> {
        WindowSplitter::new(self.chunk_size, self.chunk_overlap)
    }
}

/// Language model selection and sampling.
#[derive(Args, Debug, Clone)]
pub struct LlmArgs {
    /// Language model backend.
    #[arg(long, env = "LLM_TYPE", value_enum, ignore_case = true, default_value = "gemini")]
    pub llm_type: LlmBackend,

    /// Gemini API key.
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    /// Gemini model identifier.
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,

    /// Base URL of the Gemini API.
    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    /// Ollama server URL.
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    /// Ollama model tag.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama2:latest")]
    pub ollama_model: String,

    /// Sampling temperature.
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.3)]
    pub temperature: f32,

    /// Maximum tokens per answer.
    #[arg(long, env = "LLM_MAX_TOKENS", default_value_t = 1024)]
    pub max_tokens: usize,

    /// Seconds before model requests time out.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 120)]
    pub llm_timeout_secs: u64,

    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[arg(long, env = "CONDENSE_QUESTIONS", default_value_t = false)]
    pub condense_questions: bool,
}

impl LlmArgs {
    /// Provider connection settings.
    pub fn settings(&self) -> LlmSettings {
        LlmSettings {
            backend: self.llm_type,
            google_api_key: self.google_api_key.clone(),
            gemini_model: self.gemini_model.clone(),
            gemini_base_url: self.gemini_base_url.clone(),
            ollama_base_url: self.ollama_base_url.clone(),
            ollama_model: self.ollama_model.clone(),
            timeout_secs: self.llm_timeout_secs,
        }
    }

    /// Per-call parameters for the interview agent.
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            condense_questions: self.condense_questions,
        }
    }
}

/// Compression pipeline tuning.
#[derive(Args, Debug, Clone)]
pub struct RetrievalArgs {
    /// Candidates fetched from the index per query.
    #[arg(long, env = "RETRIEVAL_BASE_K", default_value_t = 4)]
    pub base_k: usize,

    /// Characters per re-split passage.
    #[arg(long, env = "RETRIEVAL_SPLIT_SIZE", default_value_t = 500)]
    pub split_chunk_size: usize,

    /// Similarity above which two passages count as duplicates.
    #[arg(long, env = "RETRIEVAL_REDUNDANCY_THRESHOLD", default_value_t = 0.95)]
    pub redundancy_threshold: f32,

    /// Minimum query similarity for a passage to reach the prompt.
    #[arg(long, env = "RETRIEVAL_SIMILARITY_THRESHOLD", default_value_t = 0.7)]
    pub similarity_threshold: f32,

    /// Maximum passages placed in the prompt.
    #[arg(long, env = "RETRIEVAL_TOP_K", default_value_t = 5)]
    pub top_k: usize,
}

impl RetrievalArgs {
    /// Pipeline configuration with the default ". " separator.
    pub fn compression_config(&self) -> CompressionConfig {
        CompressionConfig {
            base_k: self.base_k,
            split_chunk_size: self.split_chunk_size,
            redundancy_threshold: self.redundancy_threshold,
            similarity_threshold: self.similarity_threshold,
            top_k: self.top_k,
            ..CompressionConfig::default()
        }
    }
}

/// Session arena limits.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Maximum live sessions before the least recently used is dropped.
    #[arg(long, env = "SESSION_CAPACITY", default_value_t = 256)]
    pub session_capacity: usize,

    /// Seconds of inactivity after which a session is evicted.
    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,
}

impl SessionArgs {
    /// Idle time-to-live.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Audio backends.
#[derive(Args, Debug, Clone)]
pub struct SpeechArgs {
    /// Disable the voice endpoints entirely.
    #[arg(long, env = "DISABLE_SPEECH", default_value_t = false)]
    pub disable_speech: bool,

    /// Speech-to-text model.
    #[arg(long, env = "STT_MODEL", default_value = "whisper-1")]
    pub stt_model: String,

    /// Text-to-speech model.
    #[arg(long, env = "TTS_MODEL", default_value = "tts-1")]
    pub tts_model: String,

    /// Text-to-speech voice.
    #[arg(long, env = "TTS_VOICE", default_value = "alloy")]
    pub tts_voice: String,

    /// ffmpeg executable used to normalize uploads.
    #[arg(long, env = "FFMPEG_BIN", default_value = "ffmpeg")]
    pub ffmpeg_bin: String,
}

impl SpeechArgs {
    /// Builds the audio backends, or `None` when speech is disabled.
    pub fn build(&self, openai: &OpenAiArgs) -> AppResult<Option<SpeechServices>> {
        if self.disable_speech {
            tracing::warn!("speech disabled; voice endpoints will reject requests");
            return Ok(None);
        }
        let key = openai.api_key("speech")?;
        let transcriber = OpenAiTranscriber::new(
            key,
            &openai.openai_base_url,
            self.stt_model.clone(),
            openai.timeout(),
        )
        .map_err(|err| AppError::Config(format!("{err:#}")))?;
        let synthesizer = OpenAiSynthesizer::new(
            key,
            &openai.openai_base_url,
            self.tts_model.clone(),
            self.tts_voice.clone(),
            openai.timeout(),
        )
        .map_err(|err| AppError::Config(format!("{err:#}")))?;
        Ok(Some(SpeechServices {
            transcriber: Arc::new(transcriber),
            synthesizer: Arc::new(synthesizer),
            converter: Arc::new(FfmpegConverter::new(self.ffmpeg_bin.clone())),
        }))
    }
}
