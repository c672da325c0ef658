//! `docqa` — ingest documents and ask questions about them.
//!
//! ```text
//! docqa ingest contracts/*.txt
//! docqa ask "When does the lease end?"
//! ```
//!
//! Provider credentials come from the environment (or a `.env` file); see
//! [`docqa_rag::ServiceConfig::from_env`].

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa_rag::{FileIndexStore, RagConfig, RagPipeline, ServiceConfig, providers};
use tracing::info;

use crate::telemetry::LogFormat;

/// Answer questions from your own documents.
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about, long_about = None)]
struct Cli {
    /// Where the document index is stored
    #[arg(long, env = "DOCQA_INDEX_PATH", default_value = "docqa-index.json", global = true)]
    index: PathBuf,

    /// JSON file with chunking and retrieval settings
    #[arg(long, env = "DOCQA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a new index from text files, replacing the current one
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum chunk size in characters
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Ask a question about the ingested documents
    Ask {
        /// The question
        question: String,

        /// Number of chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// Also print the chunks the answer was based on
        #[arg(long)]
        sources: bool,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    let Some(path) = path else {
        return Ok(RagConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))
}

fn build_pipeline(cli: &Cli, config: RagConfig, with_model: bool) -> Result<RagPipeline> {
    let service = ServiceConfig::from_env()?;
    info!(
        provider = %service.provider,
        embedding_model = %service.embedding_model,
        "using provider"
    );

    let mut builder = RagPipeline::builder()
        .config(config)
        .embedding_provider(providers::embedding_provider(&service)?)
        .index_store(Arc::new(FileIndexStore::new(&cli.index)))
        .retry_backoff(service.retry_backoff);
    if with_model {
        builder = builder.language_model(providers::language_model(&service)?);
    }
    Ok(builder.build()?)
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Ingest { files, chunk_size, chunk_overlap } => {
            if let Some(size) = chunk_size {
                config.chunk_size = *size;
            }
            if let Some(overlap) = chunk_overlap {
                config.chunk_overlap = *overlap;
            }
            let pipeline = build_pipeline(&cli, config, false)?;
            let report = pipeline.ingest_paths(files).await.context("ingestion failed")?;

            for skipped in &report.skipped {
                eprintln!("skipped {}: {}", skipped.document, skipped.reason);
            }
            println!(
                "indexed {} chunks from {} documents into {}",
                report.chunks, report.documents, report.location
            );
        }
        Command::Ask { question, top_k, sources, json } => {
            if let Some(k) = top_k {
                config.top_k = *k;
            }
            let pipeline = build_pipeline(&cli, config, true)?;
            let answer = pipeline.ask(question).await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
                return Ok(());
            }
            println!("{}", answer.text);
            if *sources {
                for (rank, result) in answer.context.results.iter().enumerate() {
                    println!(
                        "\n[{}] {} #{} (score {:.3})\n{}",
                        rank + 1,
                        result.chunk.document_id,
                        result.chunk.position,
                        result.score,
                        result.chunk.text
                    );
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.quiet, cli.log_format);
    run(cli).await
}
