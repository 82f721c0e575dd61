//! OpenAI-compatible transcription and speech clients.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{clean_for_tts, Synthesizer, Transcriber};

fn authorized_client(api_key: &str, timeout: Duration) -> Result<Client> {
    anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
    let mut headers = HeaderMap::new();
    let auth = format!("Bearer {}", api_key.trim());
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
    );
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .context("failed to build OpenAI audio HTTP client")
}

/// Speech-to-text over `{base}/audio/transcriptions`.
pub struct OpenAiTranscriber {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiTranscriber {
    /// Builds a transcription client for `model` (e.g. `whisper-1`).
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: authorized_client(api_key, timeout)?,
            endpoint: format!("{}/audio/transcriptions", base_url.trim_end_matches('/')),
            model,
        })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read audio {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .context("invalid audio mime type")?;
        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        let resp = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .context("failed to call transcription endpoint")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("transcription request failed ({}): {}", status, body);
        }
        let parsed: TranscriptionResponse = resp
            .json()
            .await
            .context("failed to parse transcription response")?;
        Ok(parsed.text.trim().to_string())
    }
}

/// Text-to-speech over `{base}/audio/speech`, returning MP3.
pub struct OpenAiSynthesizer {
    client: Client,
    endpoint: String,
    model: String,
    voice: String,
}

impl OpenAiSynthesizer {
    /// Builds a speech client for `model` and `voice`.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        voice: String,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(!voice.trim().is_empty(), "missing speech voice");
        Ok(Self {
            client: authorized_client(api_key, timeout)?,
            endpoint: format!("{}/audio/speech", base_url.trim_end_matches('/')),
            model,
            voice,
        })
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let cleaned = clean_for_tts(text);
        anyhow::ensure!(!cleaned.is_empty(), "nothing to synthesize");
        let request = SpeechRequest {
            model: &self.model,
            voice: &self.voice,
            input: &cleaned,
            response_format: "mp3",
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("failed to call speech endpoint")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("speech request failed ({}): {}", status, body);
        }
        let audio = resp
            .bytes()
            .await
            .context("failed to read synthesized audio")?;
        anyhow::ensure!(!audio.is_empty(), "speech endpoint returned no audio");
        Ok(audio.to_vec())
    }
}
