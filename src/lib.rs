#![warn(missing_docs)]
//! Retrieval-augmented interview practice: knowledge-base indexing, compressed
//! context retrieval, per-session conversation memory, resume analysis and the
//! HTTP service tying them together.

pub mod compression;
pub mod config;
pub mod embedder;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod prompt;
pub mod resume;
pub mod role;
pub mod server;
pub mod speech;
pub mod splitter;

#[cfg(test)]
pub(crate) mod testing;

pub use compression::{CompressionConfig, CompressionRetriever, ContextRetriever, RetrievedPiece};
pub use embedder::Embedder;
pub use error::{AppError, AppResult};
pub use index::VectorIndex;
pub use memory::{ConversationMemory, SessionStore, Turn, TurnRole};
pub use orchestrator::{Answer, Greeting, InterviewAgent};
pub use role::JobRole;
pub use splitter::{Chunk, SourceDocument, WindowSplitter};
