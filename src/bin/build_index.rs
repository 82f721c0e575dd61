use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use interview_rag::config::{self, ChunkArgs, EmbedderArgs, OpenAiArgs};
use interview_rag::index::build_index_from_directory;

#[derive(Parser, Debug)]
#[command(
    name = "build-index",
    about = "Chunk and embed a knowledge-base directory into a persisted vector index"
)]
struct BuildIndexCli {
    /// Directory holding the knowledge-base documents.
    #[arg(long, env = "KB_DIR", default_value = "data/kb")]
    kb_dir: PathBuf,

    /// Directory the index files are written to.
    #[arg(long, env = "INDEX_DIR", default_value = "data/index")]
    index_dir: PathBuf,

    /// File extensions to ingest (repeatable or comma separated).
    #[arg(long, env = "KB_EXTENSIONS", value_delimiter = ',', default_value = "txt")]
    extensions: Vec<String>,

    #[command(flatten)]
    chunking: ChunkArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    openai: OpenAiArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    config::init_tracing();
    let cli = BuildIndexCli::parse();

    let splitter = cli.chunking.splitter().context("invalid chunking options")?;
    let embedder = cli
        .embedder
        .build(&cli.openai)
        .context("failed to configure embedder")?;
    let summary = build_index_from_directory(
        &cli.kb_dir,
        &cli.index_dir,
        &cli.extensions,
        &splitter,
        embedder,
    )
    .await
    .with_context(|| format!("failed to index {}", cli.kb_dir.display()))?;
    tracing::info!(
        documents = summary.documents,
        chunks = summary.chunks,
        index_dir = %cli.index_dir.display(),
        "index build complete"
    );
    Ok(())
}
