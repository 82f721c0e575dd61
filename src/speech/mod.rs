//! Speech-to-text, text-to-speech and audio conversion.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::TempPath;

mod ffmpeg;
mod openai;

pub use ffmpeg::FfmpegConverter;
pub use openai::{OpenAiSynthesizer, OpenAiTranscriber};

/// Temporary audio file, deleted when dropped.
pub type TempAudio = TempPath;

/// Turns an audio file into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes the audio at `path`; the result is trimmed.
    async fn transcribe(&self, path: &Path) -> Result<String>;
}

/// Turns text into MP3 audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesizes `text` and returns the encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Normalizes uploaded audio to WAV before transcription.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    /// Converts `input` into a new WAV file.
    async fn to_wav(&self, input: &Path) -> Result<TempAudio>;
}

/// Audio backends used by the voice endpoints.
#[derive(Clone)]
pub struct SpeechServices {
    /// Speech-to-text backend.
    pub transcriber: Arc<dyn Transcriber>,
    /// Text-to-speech backend.
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Upload normalizer run before transcription.
    pub converter: Arc<dyn AudioConverter>,
}

/// Writes uploaded bytes to a temporary file with the given suffix (e.g. `.webm`).
pub fn stage_upload(bytes: &[u8], suffix: &str) -> Result<TempAudio> {
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(suffix)
        .tempfile()
        .context("failed to create temporary audio file")?;
    file.write_all(bytes)
        .context("failed to write temporary audio file")?;
    file.flush().context("failed to flush temporary audio file")?;
    Ok(file.into_temp_path())
}

/// File suffix for an uploaded file name, falling back to `default`.
pub fn upload_suffix(file_name: Option<&str>, default: &str) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|ch| ch.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_else(|| default.to_string())
}

/// Strips markdown bullets and emphasis so the voice does not read them out.
pub fn clean_for_tts(text: &str) -> String {
    let mut cleaned = text.to_string();
    for marker in ["* ", "- ", "\u{2022} ", "**", "*"] {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.trim().to_string()
}
