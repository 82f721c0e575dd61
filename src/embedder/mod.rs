//! Embedding backends and vector helpers shared by indexing and retrieval.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAiEmbedder;

/// Text embedding function.
///
/// Index build and query time must use embedders with the same [`Embedder::id`];
/// vectors from different models are not comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier persisted in the index manifest (backend, model and dimensions).
    fn id(&self) -> String;

    /// Maximum inputs accepted by a single [`Embedder::embed_batch`] call.
    fn batch_size(&self) -> usize;

    /// Embeds a batch of at most [`Embedder::batch_size`] inputs, preserving order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embeds any number of inputs by slicing them into backend-sized batches.
pub async fn embed_all(embedder: &dyn Embedder, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
    let batch_size = embedder.batch_size().max(1);
    let mut out = Vec::with_capacity(inputs.len());
    for batch in inputs.chunks(batch_size) {
        let vectors = embedder.embed_batch(batch).await?;
        anyhow::ensure!(
            vectors.len() == batch.len(),
            "embedder returned {} vectors for {} inputs",
            vectors.len(),
            batch.len()
        );
        out.extend(vectors);
    }
    Ok(out)
}

/// Embeds a single input.
pub async fn embed_one(embedder: &dyn Embedder, input: &str) -> Result<Vec<f32>> {
    embedder
        .embed_batch(&[input.to_string()])
        .await?
        .pop()
        .ok_or_else(|| anyhow!("embedder returned no vector"))
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
