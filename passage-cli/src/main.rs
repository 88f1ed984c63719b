//! `passage`: build an index from a text file, then ask it questions.
//!
//! ```bash
//! # Chunk and embed a document, writing notes_index.json beside it
//! passage index notes.txt
//!
//! # Ask a question, keeping only passages with similarity >= 0.5
//! passage ask notes_index.json "What does the author propose?" --threshold 0.5
//!
//! # Compare against an answer without retrieval
//! passage ask notes_index.json "What does the author propose?" --compare
//! ```
//!
//! Credentials come from `YANDEX_FOLDER_ID` and `YANDEX_API_KEY`, read from
//! the environment or a `.env` file. Logs go to stderr and honour `RUST_LOG`.

mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use passage_rag::yandex::{YandexCompletionProvider, YandexConfig, YandexEmbeddingProvider};
use passage_rag::{
    IndexStore, JsonIndexStore, RagConfig, RagConfigBuilder, RagPipeline, default_index_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "passage")]
#[command(about = "Answer questions about a private document with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk and embed a text file, saving the index as JSON
    Index(IndexArgs),

    /// Ask a question against a saved index
    Ask(AskArgs),
}

#[derive(Args)]
struct IndexArgs {
    /// UTF-8 text file to index
    source: PathBuf,

    /// Where to write the index (default: <source stem>_index.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Chunk window size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between consecutive chunks in characters
    #[arg(long)]
    overlap: Option<usize>,

    /// Embedding requests in flight at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// JSON config file; flags override its values
    #[arg(long, env = "PASSAGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct AskArgs {
    /// Index file written by `passage index`
    index: PathBuf,

    /// The question to answer
    question: String,

    /// Number of top-ranked passages considered
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Minimum similarity a passage needs to enter the prompt
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// Completion token budget
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Also answer without retrieval and print both
    #[arg(long)]
    compare: bool,

    /// JSON config file; flags override its values
    #[arg(long, env = "PASSAGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        Command::Index(args) => run_index(args, &cancel).await,
        Command::Ask(args) => run_ask(args, &cancel).await,
    }
}

async fn run_index(args: IndexArgs, cancel: &CancellationToken) -> Result<()> {
    let mut builder = base_config(args.config.as_deref())?;
    if let Some(size) = args.chunk_size {
        builder = builder.chunk_size(size);
    }
    if let Some(overlap) = args.overlap {
        builder = builder.chunk_overlap(overlap);
    }
    if let Some(workers) = args.concurrency {
        builder = builder.embedding_concurrency(workers);
    }
    let pipeline = pipeline(builder.build()?)?;

    let index = pipeline
        .build_index_from_file_with_cancel(&args.source, cancel)
        .await
        .with_context(|| format!("failed to index {}", args.source.display()))?;

    let output = args.output.unwrap_or_else(|| default_index_path(&args.source));
    JsonIndexStore.save(&index, &output).await?;

    print!("{}", report::index_summary(&index, &output));
    Ok(())
}

async fn run_ask(args: AskArgs, cancel: &CancellationToken) -> Result<()> {
    let mut builder = base_config(args.config.as_deref())?;
    if let Some(k) = args.top_k {
        builder = builder.top_k(k);
    }
    if let Some(threshold) = args.threshold {
        builder = builder.similarity_threshold(threshold);
    }
    if let Some(temperature) = args.temperature {
        builder = builder.temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    let pipeline = pipeline(builder.build()?)?;

    let index = JsonIndexStore
        .load(&args.index)
        .await
        .with_context(|| format!("failed to load index {}", args.index.display()))?;
    info!(passages = index.len(), question = %args.question, "answering");

    if args.compare {
        let comparison = tokio::select! {
            biased;
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            comparison = pipeline.compare(&index, &args.question) => comparison,
        };
        print!("{}", report::comparison(&comparison));
    } else {
        let answer = pipeline.ask_with_cancel(&index, &args.question, cancel).await?;
        print!("{}", report::answer(&answer));
    }
    Ok(())
}

fn base_config(path: Option<&Path>) -> Result<RagConfigBuilder> {
    let config = match path {
        Some(path) => RagConfig::from_json_file(path)?,
        None => RagConfig::default(),
    };
    Ok(RagConfigBuilder::from_config(config))
}

fn pipeline(config: RagConfig) -> Result<RagPipeline> {
    let yandex = YandexConfig::from_env()?;
    Ok(RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(YandexEmbeddingProvider::new(yandex.clone())?))
        .completion_provider(Arc::new(YandexCompletionProvider::new(yandex)?))
        .build()?)
}
