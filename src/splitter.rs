//! Text splitting primitives for knowledge-base chunks and retrieved passages.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Default characters per indexed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 900;
/// Default characters shared between consecutive indexed chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Raw document read from the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Trimmed UTF-8 body.
    pub content: String,
    /// Path (or other identifier) the body came from.
    pub source_id: String,
}

impl SourceDocument {
    /// Builds a new source document.
    pub fn new(content: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
        }
    }
}

/// Bounded window of a source document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Window text.
    pub text: String,
    /// Identifier of the document this window was cut from.
    pub source_id: String,
    /// Zero-based position of the window within its document.
    pub sequence_index: usize,
}

/// Fixed-size sliding window splitter measured in characters.
///
/// Windows start every `chunk_size - chunk_overlap` characters, so adjacent
/// windows share exactly `chunk_overlap` characters and only the final window
/// of a document may be shorter than `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for WindowSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl WindowSplitter {
    /// Builds a splitter, rejecting overlaps that would never advance.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::Config("chunk size must be positive".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::Config(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Maximum characters per window.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by adjacent windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Cuts one text into overlapping windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let bounds = char_boundaries(text);
        let len = bounds.len() - 1;
        let step = self.chunk_size - self.chunk_overlap;

        let mut windows = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.chunk_size).min(len);
            windows.push(text[bounds[start]..bounds[end]].to_string());
            if end == len {
                break;
            }
            start += step;
        }
        windows
    }

    /// Splits every document, copying its source id onto each chunk.
    pub fn split_documents(&self, documents: &[SourceDocument]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(|(sequence_index, text)| Chunk {
                        text,
                        source_id: doc.source_id.clone(),
                        sequence_index,
                    })
            })
            .collect()
    }

    /// Rebuilds a document from its ordered windows by dropping each overlap.
    pub fn reconstruct<S: AsRef<str>>(&self, windows: &[S]) -> String {
        let mut out = String::new();
        for (idx, window) in windows.iter().enumerate() {
            let window = window.as_ref();
            if idx == 0 {
                out.push_str(window);
            } else {
                out.extend(window.chars().skip(self.chunk_overlap));
            }
        }
        out
    }
}

/// Separator-aware splitter used to break oversized retrieved passages.
///
/// Segments are merged greedily up to `chunk_size` characters. A single
/// segment longer than the limit cannot be split further and is kept whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeparatorSplitter {
    separator: String,
    chunk_size: usize,
}

impl SeparatorSplitter {
    /// Builds a new separator splitter.
    pub fn new(separator: impl Into<String>, chunk_size: usize) -> AppResult<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(AppError::Config("split separator must not be empty".into()));
        }
        if chunk_size == 0 {
            return Err(AppError::Config("split chunk size must be positive".into()));
        }
        Ok(Self {
            separator,
            chunk_size,
        })
    }

    /// Maximum characters per merged piece.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Splits `text` on the separator and re-merges segments up to the size limit.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if trimmed.chars().count() <= self.chunk_size {
            return vec![trimmed.to_string()];
        }

        let sep_len = self.separator.chars().count();
        let mut pieces = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;

        for segment in trimmed.split(self.separator.as_str()) {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let seg_len = segment.chars().count();
            let joined_len = if current.is_empty() {
                seg_len
            } else {
                current_len + sep_len + seg_len
            };
            if joined_len > self.chunk_size && !current.is_empty() {
                pieces.push(current.join(&self.separator));
                current.clear();
                current_len = 0;
            }
            if seg_len > self.chunk_size {
                tracing::debug!(
                    segment_chars = seg_len,
                    limit = self.chunk_size,
                    "segment exceeds split size and cannot be divided further"
                );
            }
            current_len = if current.is_empty() {
                seg_len
            } else {
                current_len + sep_len + seg_len
            };
            current.push(segment);
        }
        if !current.is_empty() {
            pieces.push(current.join(&self.separator));
        }
        pieces
    }
}

fn char_boundaries(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect()
}
