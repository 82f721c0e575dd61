use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use interview_rag::compression::CompressionRetriever;
use interview_rag::config::{
    self, EmbedderArgs, LlmArgs, OpenAiArgs, RetrievalArgs, SessionArgs, SpeechArgs,
};
use interview_rag::index::VectorIndex;
use interview_rag::llm::build_provider;
use interview_rag::memory::SessionStore;
use interview_rag::orchestrator::InterviewAgent;
use interview_rag::prompt::PromptComposer;
use interview_rag::resume::ResumeAnalyzer;
use interview_rag::server::{router, AppState};

#[derive(Parser, Debug)]
#[command(
    name = "interview-server",
    about = "HTTP API for retrieval-augmented interview practice"
)]
struct ServeCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "INTERVIEW_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Directory holding the persisted vector index.
    #[arg(long, env = "INDEX_DIR", default_value = "data/index")]
    index_dir: PathBuf,

    /// Language the interviewer answers in.
    #[arg(long, env = "RESPONSE_LANGUAGE", default_value = "English")]
    response_language: String,

    /// Seconds between idle-session sweeps.
    #[arg(long, env = "SESSION_SWEEP_SECS", default_value_t = 60)]
    sweep_interval_secs: u64,

    #[command(flatten)]
    openai: OpenAiArgs,

    #[command(flatten)]
    embedder: EmbedderArgs,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    retrieval: RetrievalArgs,

    #[command(flatten)]
    sessions: SessionArgs,

    #[command(flatten)]
    speech: SpeechArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    config::init_tracing();
    let cli = ServeCli::parse();

    let embedder = cli
        .embedder
        .build(&cli.openai)
        .context("failed to configure embedder")?;
    let index = VectorIndex::load(&cli.index_dir, Arc::clone(&embedder))
        .with_context(|| format!("failed to load index from {}", cli.index_dir.display()))?;
    tracing::info!(chunks = index.len(), dir = %cli.index_dir.display(), "vector index loaded");
    let retriever =
        CompressionRetriever::with_defaults(Arc::new(index), &cli.retrieval.compression_config())
            .context("invalid retrieval options")?;
    let llm = build_provider(&cli.llm.settings()).context("failed to configure language model")?;
    let speech = cli
        .speech
        .build(&cli.openai)
        .context("failed to configure speech")?;

    let sessions = Arc::new(SessionStore::new(
        cli.sessions.session_capacity,
        cli.sessions.idle_ttl(),
    ));
    let agent = InterviewAgent::new(
        Arc::new(retriever),
        llm,
        PromptComposer::new(cli.response_language.clone()),
        Arc::clone(&sessions),
        cli.llm.agent_settings(),
    );
    let state = AppState::new(
        Arc::new(agent),
        Arc::new(ResumeAnalyzer::new(embedder)),
        speech,
    );

    let sweep_every = Duration::from_secs(cli.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            sessions.evict_idle().await;
        }
    });

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("interview-server listening on http://{addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
