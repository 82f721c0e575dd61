//! Contextual compression over raw similarity-search results.
//!
//! A [`CompressionRetriever`] fetches candidates from the [`VectorIndex`] and
//! runs them through an ordered list of [`DocumentTransform`] stages: split
//! oversized passages, drop near-duplicates, drop passages unrelated to the
//! query, then reorder survivors for long-context placement.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedder::{cosine_similarity, embed_all, embed_one, Embedder};
use crate::error::{AppError, AppResult};
use crate::index::{ScoredChunk, VectorIndex};
use crate::splitter::SeparatorSplitter;

/// Tuning knobs for the default compression pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    /// Candidates fetched from the index before compression.
    pub base_k: usize,
    /// Separator used to re-split oversized passages.
    pub split_separator: String,
    /// Maximum characters per re-split passage.
    pub split_chunk_size: usize,
    /// Pairwise similarity above which a passage counts as redundant.
    pub redundancy_threshold: f32,
    /// Minimum query similarity for a passage to survive.
    pub similarity_threshold: f32,
    /// Maximum passages handed to the prompt.
    pub top_k: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            base_k: 4,
            split_separator: ". ".to_string(),
            split_chunk_size: 500,
            redundancy_threshold: 0.95,
            similarity_threshold: 0.7,
            top_k: 5,
        }
    }
}

/// Passage flowing through the compression stages.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPiece {
    /// Passage text.
    pub text: String,
    /// Originating document.
    pub source_id: String,
    /// Position of the originating chunk within its document.
    pub sequence_index: usize,
    /// Similarity reported by the base index search.
    pub index_score: f32,
    /// Similarity to the query computed by the relevance stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_similarity: Option<f32>,
    #[serde(skip)]
    embedding: Option<Vec<f32>>,
}

impl RetrievedPiece {
    /// Best available relevance estimate, preferring the relevance-stage score.
    pub fn relevance(&self) -> f32 {
        self.query_similarity.unwrap_or(self.index_score)
    }

    /// Cached embedding, if a stage has computed one.
    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    fn derived(&self, text: String) -> Self {
        Self {
            text,
            source_id: self.source_id.clone(),
            sequence_index: self.sequence_index,
            index_score: self.index_score,
            query_similarity: None,
            embedding: None,
        }
    }
}

impl From<ScoredChunk> for RetrievedPiece {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            text: hit.chunk.text,
            source_id: hit.chunk.source_id,
            sequence_index: hit.chunk.sequence_index,
            index_score: hit.score,
            query_similarity: None,
            embedding: None,
        }
    }
}

/// One swappable stage of the compression pipeline.
#[async_trait]
pub trait DocumentTransform: Send + Sync {
    /// Short label used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Transforms the passages for `query`.
    async fn transform(&self, query: &str, pieces: Vec<RetrievedPiece>)
        -> Result<Vec<RetrievedPiece>>;
}

/// Source of prompt context for a question.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Returns the passages to place in the prompt, in prompt order.
    async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievedPiece>>;
}

/// Re-splits passages longer than the splitter's size.
pub struct SubSplit {
    splitter: SeparatorSplitter,
}

impl SubSplit {
    /// Wraps a separator splitter as a stage.
    pub fn new(splitter: SeparatorSplitter) -> Self {
        Self { splitter }
    }
}

#[async_trait]
impl DocumentTransform for SubSplit {
    fn name(&self) -> &'static str {
        "sub_split"
    }

    async fn transform(
        &self,
        _query: &str,
        pieces: Vec<RetrievedPiece>,
    ) -> Result<Vec<RetrievedPiece>> {
        let mut out = Vec::with_capacity(pieces.len());
        for piece in pieces {
            if piece.text.chars().count() <= self.splitter.chunk_size() {
                out.push(piece);
                continue;
            }
            for part in self.splitter.split_text(&piece.text) {
                out.push(piece.derived(part));
            }
        }
        Ok(out)
    }
}

/// Drops passages nearly identical to an earlier kept passage.
pub struct RedundancyFilter {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
}

impl RedundancyFilter {
    /// Builds the filter with a similarity `threshold` in `[0, 1]`.
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }
}

#[async_trait]
impl DocumentTransform for RedundancyFilter {
    fn name(&self) -> &'static str {
        "redundancy_filter"
    }

    async fn transform(
        &self,
        _query: &str,
        mut pieces: Vec<RetrievedPiece>,
    ) -> Result<Vec<RetrievedPiece>> {
        ensure_embeddings(self.embedder.as_ref(), &mut pieces).await?;
        let mut kept: Vec<RetrievedPiece> = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let vector = piece.embedding().unwrap_or(&[]);
            let redundant = kept.iter().any(|existing| {
                cosine_similarity(existing.embedding().unwrap_or(&[]), vector) > self.threshold
            });
            if redundant {
                tracing::debug!(source = %piece.source_id, "dropping redundant passage");
            } else {
                kept.push(piece);
            }
        }
        Ok(kept)
    }
}

/// Keeps at most `k` passages whose query similarity meets the threshold.
pub struct RelevanceFilter {
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    k: usize,
}

impl RelevanceFilter {
    /// Builds the filter.
    pub fn new(embedder: Arc<dyn Embedder>, threshold: f32, k: usize) -> Self {
        Self {
            embedder,
            threshold,
            k,
        }
    }
}

#[async_trait]
impl DocumentTransform for RelevanceFilter {
    fn name(&self) -> &'static str {
        "relevance_filter"
    }

    async fn transform(
        &self,
        query: &str,
        mut pieces: Vec<RetrievedPiece>,
    ) -> Result<Vec<RetrievedPiece>> {
        if pieces.is_empty() {
            return Ok(pieces);
        }
        ensure_embeddings(self.embedder.as_ref(), &mut pieces).await?;
        let query_vector = embed_one(self.embedder.as_ref(), query).await?;
        for piece in &mut pieces {
            let similarity = cosine_similarity(&query_vector, piece.embedding().unwrap_or(&[]));
            piece.query_similarity = Some(similarity);
        }
        pieces.retain(|piece| piece.relevance() >= self.threshold);
        pieces.sort_by(|a, b| {
            b.relevance()
                .partial_cmp(&a.relevance())
                .unwrap_or(Ordering::Equal)
        });
        pieces.truncate(self.k);
        Ok(pieces)
    }
}

/// Places the most relevant passages at both ends and the least relevant in the middle.
pub struct LongContextReorder;

#[async_trait]
impl DocumentTransform for LongContextReorder {
    fn name(&self) -> &'static str {
        "long_context_reorder"
    }

    async fn transform(
        &self,
        _query: &str,
        mut pieces: Vec<RetrievedPiece>,
    ) -> Result<Vec<RetrievedPiece>> {
        pieces.sort_by(|a, b| {
            b.relevance()
                .partial_cmp(&a.relevance())
                .unwrap_or(Ordering::Equal)
        });
        Ok(long_context_reorder(pieces))
    }
}

/// Reorders a relevance-descending list so rank 1 and rank 2 sit at the two
/// ends and the lowest ranks drift towards the middle.
pub fn long_context_reorder<T>(ranked: Vec<T>) -> Vec<T> {
    let mut reordered = VecDeque::with_capacity(ranked.len());
    for (idx, item) in ranked.into_iter().rev().enumerate() {
        if idx % 2 == 1 {
            reordered.push_back(item);
        } else {
            reordered.push_front(item);
        }
    }
    reordered.into()
}

/// Index search followed by the compression stages.
pub struct CompressionRetriever {
    index: Arc<VectorIndex>,
    base_k: usize,
    stages: Vec<Box<dyn DocumentTransform>>,
}

impl CompressionRetriever {
    /// Retriever with no stages; add some with [`CompressionRetriever::with_stages`].
    pub fn new(index: Arc<VectorIndex>, base_k: usize) -> Self {
        Self {
            index,
            base_k: base_k.max(1),
            stages: Vec::new(),
        }
    }

    /// Retriever running the standard split, dedupe, filter and reorder stages.
    pub fn with_defaults(index: Arc<VectorIndex>, config: &CompressionConfig) -> AppResult<Self> {
        let embedder = index.embedder();
        let splitter =
            SeparatorSplitter::new(config.split_separator.clone(), config.split_chunk_size)?;
        let stages: Vec<Box<dyn DocumentTransform>> = vec![
            Box::new(SubSplit::new(splitter)),
            Box::new(RedundancyFilter::new(
                Arc::clone(&embedder),
                config.redundancy_threshold,
            )),
            Box::new(RelevanceFilter::new(
                embedder,
                config.similarity_threshold,
                config.top_k.max(1),
            )),
            Box::new(LongContextReorder),
        ];
        Ok(Self::new(index, config.base_k).with_stages(stages))
    }

    /// Replaces the stage list.
    pub fn with_stages(mut self, stages: Vec<Box<dyn DocumentTransform>>) -> Self {
        self.stages = stages;
        self
    }

    /// Names of the configured stages, in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }
}

#[async_trait]
impl ContextRetriever for CompressionRetriever {
    async fn retrieve(&self, query: &str) -> AppResult<Vec<RetrievedPiece>> {
        let hits = self.index.search(query, self.base_k).await?;
        let mut pieces: Vec<RetrievedPiece> = hits.into_iter().map(RetrievedPiece::from).collect();
        let fetched = pieces.len();
        for stage in &self.stages {
            pieces = stage
                .transform(query, pieces)
                .await
                .map_err(|err| AppError::Retrieval(format!("{} stage failed: {err:#}", stage.name())))?;
        }
        tracing::debug!(fetched, kept = pieces.len(), "compressed retrieval result");
        Ok(pieces)
    }
}

async fn ensure_embeddings(embedder: &dyn Embedder, pieces: &mut [RetrievedPiece]) -> Result<()> {
    let missing: Vec<usize> = pieces
        .iter()
        .enumerate()
        .filter(|(_, piece)| piece.embedding.is_none())
        .map(|(idx, _)| idx)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    let texts: Vec<String> = missing.iter().map(|&idx| pieces[idx].text.clone()).collect();
    let vectors = embed_all(embedder, &texts).await?;
    for (idx, vector) in missing.into_iter().zip(vectors) {
        pieces[idx].embedding = Some(vector);
    }
    Ok(())
}
