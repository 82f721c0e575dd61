//! Persisted brute-force vector index over knowledge-base chunks.
//!
//! On disk an index is a directory holding `chunks.jsonl` (one embedded chunk
//! per line) and `index.json` (the manifest). The manifest is written last, so
//! a directory without one is never mistaken for a complete index.

use std::cmp::Ordering;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};

use crate::embedder::{cosine_similarity, embed_all, embed_one, Embedder};
use crate::error::{AppError, AppResult};
use crate::ingest::ingest_directory;
use crate::splitter::{Chunk, WindowSplitter};

/// Bumped whenever the on-disk layout changes.
pub const INDEX_FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "index.json";
const CHUNKS_FILE: &str = "chunks.jsonl";

/// Similarity metric used to rank chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine similarity between raw embedding vectors.
    Cosine,
}

/// Header describing how an index was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// On-disk layout version.
    pub format_version: u32,
    /// Identifier of the embedder used at build time.
    pub embedder: String,
    /// Embedding dimension shared by every vector.
    pub dimensions: usize,
    /// Ranking metric.
    pub metric: DistanceMetric,
    /// Number of chunk lines in `chunks.jsonl`.
    pub chunk_count: usize,
}

/// Chunk plus its embedding, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Indexed chunk.
    #[serde(flatten)]
    pub chunk: Chunk,
    /// CRC32 of the chunk text, checked on load.
    pub checksum: u32,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

/// Search hit with its similarity in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Matching chunk.
    pub chunk: Chunk,
    /// Cosine similarity clamped at zero.
    pub score: f32,
}

/// Hits ordered by descending score.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Summary returned by [`build_index_from_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Documents read from the knowledge base.
    pub documents: usize,
    /// Chunks embedded and written.
    pub chunks: usize,
}

/// In-memory vector index bound to the embedder it was built or loaded with.
pub struct VectorIndex {
    manifest: IndexManifest,
    entries: Vec<IndexedChunk>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Embeds every chunk and returns a searchable index.
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> AppResult<Self> {
        if chunks.is_empty() {
            return Err(AppError::Index("refusing to build an empty index".into()));
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_all(embedder.as_ref(), &texts)
            .await
            .map_err(|err| AppError::Index(format!("failed to embed chunks: {err:#}")))?;
        let dimensions = vectors.first().map(Vec::len).unwrap_or(0);
        if dimensions == 0 || vectors.iter().any(|v| v.len() != dimensions) {
            return Err(AppError::Index(
                "embedder returned inconsistent vector dimensions".into(),
            ));
        }
        let entries: Vec<IndexedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| IndexedChunk {
                checksum: checksum(&chunk.text),
                chunk,
                embedding,
            })
            .collect();
        let manifest = IndexManifest {
            format_version: INDEX_FORMAT_VERSION,
            embedder: embedder.id(),
            dimensions,
            metric: DistanceMetric::Cosine,
            chunk_count: entries.len(),
        };
        Ok(Self {
            manifest,
            entries,
            embedder,
        })
    }

    /// Writes the index to `dir`, replacing any previous index atomically per file.
    pub fn save(&self, dir: &Path) -> AppResult<()> {
        fs::create_dir_all(dir).map_err(|err| {
            AppError::Index(format!("failed to create {}: {err}", dir.display()))
        })?;
        let chunks_path = dir.join(CHUNKS_FILE);
        let manifest_path = dir.join(MANIFEST_FILE);

        write_atomically(&chunks_path, |writer| {
            for entry in &self.entries {
                serde_json::to_writer(&mut *writer, entry)?;
                writer.write_all(b"\n")?;
            }
            Ok(())
        })?;
        write_atomically(&manifest_path, |writer| {
            serde_json::to_writer_pretty(&mut *writer, &self.manifest)?;
            Ok(())
        })?;
        tracing::info!(
            path = %dir.display(),
            chunks = self.entries.len(),
            "vector index saved"
        );
        Ok(())
    }

    /// Loads a persisted index without re-embedding.
    ///
    /// Fails when the directory is missing, a file is malformed, a checksum
    /// does not match, or `embedder` differs from the build-time embedder.
    pub fn load(dir: &Path, embedder: Arc<dyn Embedder>) -> AppResult<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_file = File::open(&manifest_path).map_err(|err| {
            AppError::Index(format!("failed to open {}: {err}", manifest_path.display()))
        })?;
        let manifest: IndexManifest = serde_json::from_reader(BufReader::new(manifest_file))
            .map_err(|err| AppError::Index(format!("malformed index manifest: {err}")))?;

        if manifest.format_version != INDEX_FORMAT_VERSION {
            return Err(AppError::Index(format!(
                "index format {} is not supported (expected {})",
                manifest.format_version, INDEX_FORMAT_VERSION
            )));
        }
        let configured = embedder.id();
        if manifest.embedder != configured {
            return Err(AppError::Index(format!(
                "index was built with embedder {} but {} is configured",
                manifest.embedder, configured
            )));
        }

        let chunks_path = dir.join(CHUNKS_FILE);
        let chunks_file = File::open(&chunks_path).map_err(|err| {
            AppError::Index(format!("failed to open {}: {err}", chunks_path.display()))
        })?;
        let mut entries = Vec::with_capacity(manifest.chunk_count);
        for (line_no, line) in BufReader::new(chunks_file).lines().enumerate() {
            let line = line.map_err(|err| {
                AppError::Index(format!("failed to read chunk line {}: {err}", line_no + 1))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: IndexedChunk = serde_json::from_str(&line).map_err(|err| {
                AppError::Index(format!("malformed chunk on line {}: {err}", line_no + 1))
            })?;
            if entry.embedding.len() != manifest.dimensions {
                return Err(AppError::Index(format!(
                    "chunk on line {} has {} dimensions, manifest says {}",
                    line_no + 1,
                    entry.embedding.len(),
                    manifest.dimensions
                )));
            }
            if checksum(&entry.chunk.text) != entry.checksum {
                return Err(AppError::Index(format!(
                    "checksum mismatch for chunk on line {}",
                    line_no + 1
                )));
            }
            entries.push(entry);
        }
        if entries.len() != manifest.chunk_count {
            return Err(AppError::Index(format!(
                "manifest lists {} chunks but {} were found",
                manifest.chunk_count,
                entries.len()
            )));
        }
        tracing::info!(
            path = %dir.display(),
            chunks = entries.len(),
            embedder = %manifest.embedder,
            "vector index loaded"
        );
        Ok(Self {
            manifest,
            entries,
            embedder,
        })
    }

    /// Embeds `query` and returns the `k` most similar chunks.
    pub async fn search(&self, query: &str, k: usize) -> AppResult<RetrievalResult> {
        let vector = embed_one(self.embedder.as_ref(), query)
            .await
            .map_err(AppError::retrieval)?;
        if vector.len() != self.manifest.dimensions {
            return Err(AppError::Retrieval(format!(
                "query embedding has {} dimensions, index expects {}",
                vector.len(),
                self.manifest.dimensions
            )));
        }
        Ok(self.search_by_vector(&vector, k))
    }

    /// Ranks chunks against an already-embedded query.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> RetrievalResult {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (idx, cosine_similarity(query, &entry.embedding).max(0.0)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
            .into_iter()
            .map(|(idx, score)| ScoredChunk {
                chunk: self.entries[idx].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Embedder bound to this index.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// Build-time manifest.
    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Offline pipeline: ingest a directory, chunk it, embed it and persist the index.
///
/// Nothing is written when the knowledge base yields no documents.
pub async fn build_index_from_directory(
    kb_dir: &Path,
    index_dir: &Path,
    extensions: &[String],
    splitter: &WindowSplitter,
    embedder: Arc<dyn Embedder>,
) -> AppResult<BuildSummary> {
    let documents = ingest_directory(kb_dir, extensions)?;
    let chunks = splitter.split_documents(&documents);
    tracing::info!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = splitter.chunk_size(),
        chunk_overlap = splitter.chunk_overlap(),
        "split knowledge base"
    );
    let chunk_count = chunks.len();
    let index = VectorIndex::build(chunks, embedder).await?;
    index.save(index_dir)?;
    Ok(BuildSummary {
        documents: documents.len(),
        chunks: chunk_count,
    })
}

fn checksum(text: &str) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(text.as_bytes());
    hasher.finalize()
}

fn write_atomically<F>(path: &Path, body: F) -> AppResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> anyhow::Result<()>,
{
    let tmp_path = path.with_extension("tmp");
    let result = (|| -> anyhow::Result<()> {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        body(&mut writer)?;
        writer.flush()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    })();
    result.map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        AppError::Index(format!("failed to write {}: {err:#}", path.display()))
    })
}
