//! Deterministic fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::compression::{ContextRetriever, RetrievedPiece};
use crate::embedder::Embedder;
use crate::error::{AppError, AppResult};
use crate::index::ScoredChunk;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::speech::{AudioConverter, Synthesizer, TempAudio, Transcriber};
use crate::splitter::Chunk;

/// Embedder answering from a fixed text-to-vector table; unknown text maps to zeros.
#[derive(Default)]
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimensions: usize,
}

impl StaticEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.dimensions = vector.len();
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl Embedder for StaticEmbedder {
    fn id(&self) -> String {
        format!("static:{}", self.dimensions)
    }

    fn batch_size(&self) -> usize {
        16
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.dimensions])
            })
            .collect())
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn id(&self) -> String {
        "failing".into()
    }

    fn batch_size(&self) -> usize {
        8
    }

    async fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

/// LLM returning queued answers in order (then a fixed fallback) and
/// recording every prompt it saw.
pub struct ScriptedLlm {
    answers: Mutex<VecDeque<String>>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn always(answer: &str) -> Arc<Self> {
        Self::queued(&[], answer)
    }

    pub fn queued(answers: &[&str], fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| anyhow!("prompt log poisoned"))?
            .push(request.prompt.to_string());
        let next = self
            .answers
            .lock()
            .map_err(|_| anyhow!("answer queue poisoned"))?
            .pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// LLM whose every call fails.
pub struct FailingLlm;

#[async_trait]
impl LlmProvider for FailingLlm {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String> {
        bail!("model endpoint unreachable")
    }
}

/// Retriever returning fixed pieces, or failing when built with `failing()`.
pub struct StaticRetriever {
    pieces: Vec<RetrievedPiece>,
    fail: bool,
}

impl StaticRetriever {
    pub fn new(texts: &[&str]) -> Arc<Self> {
        let pieces = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                RetrievedPiece::from(ScoredChunk {
                    chunk: Chunk {
                        text: text.to_string(),
                        source_id: format!("kb/doc{idx}.txt"),
                        sequence_index: 0,
                    },
                    score: 0.9,
                })
            })
            .collect();
        Arc::new(Self {
            pieces,
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            pieces: Vec::new(),
            fail: true,
        })
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> AppResult<Vec<RetrievedPiece>> {
        if self.fail {
            return Err(AppError::Retrieval("index search failed".into()));
        }
        Ok(self.pieces.clone())
    }
}

/// Transcriber returning a fixed transcript.
pub struct FixedTranscriber(pub String);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<String> {
        anyhow::ensure!(path.exists(), "audio file {} missing", path.display());
        Ok(self.0.clone())
    }
}

/// Synthesizer echoing the text bytes back as "audio".
pub struct EchoSynthesizer;

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

/// Converter that copies the input into a new `.wav` temp file.
pub struct CopyConverter;

#[async_trait]
impl AudioConverter for CopyConverter {
    async fn to_wav(&self, input: &Path) -> Result<TempAudio> {
        let bytes = tokio::fs::read(input).await?;
        crate::speech::stage_upload(&bytes, ".wav")
    }
}
