//! Offline feature-hashing embedder.
//!
//! Tokens are hashed into a fixed number of signed buckets and the resulting
//! vector is L2-normalized. Quality is far below a neural model, but it needs
//! no network access and is fully deterministic, which makes it useful for
//! local development and tests.

use anyhow::Result;
use async_trait::async_trait;
use crc32fast::Hasher as Crc32;

use super::Embedder;

const DEFAULT_BATCH: usize = 256;

/// Deterministic bag-of-words embedder based on CRC32 feature hashing.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
    batch_size: usize,
}

impl HashingEmbedder {
    /// Builds an embedder producing vectors of `dimensions` entries.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            batch_size: DEFAULT_BATCH,
        }
    }

    /// Overrides the batch size reported to callers.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embeds one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let mut hasher = Crc32::new();
            hasher.update(token.as_bytes());
            let hash = hasher.finalize();
            let bucket = (hash as usize) % self.dimensions;
            let sign = if hash & 0x8000_0000 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn id(&self) -> String {
        format!("hashing:crc32:{}", self.dimensions)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_lowercase())
}
