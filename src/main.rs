use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use ragdock::config::load_config;
use ragdock::models::SearchMode;
use ragdock::rag::RagEngine;
use ragdock::server::run_server;
use ragdock::watcher::WatchService;

#[derive(Parser)]
#[command(
    name = "ragdock",
    about = "A local RAG server: watched-directory ingestion, LanceDB hybrid retrieval, tool-call API",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./ragdock.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the documents directory once and exit
    Sync,

    /// Search indexed documents
    Search {
        /// Search query
        query: String,

        /// Search mode: semantic, keyword, or hybrid
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the tool-call HTTP server with the directory watcher
    Serve {
        /// Skip the initial sync on startup
        #[arg(long)]
        no_initial_sync: bool,
    },

    /// Show index status
    Status,

    /// Drop the index and rebuild it from the documents directory
    Reindex {
        /// Also clear the query-embedding cache
        #[arg(long)]
        clear_cache: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ragdock=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    std::fs::create_dir_all(&config.documents_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(RagEngine::new(config));
    engine.initialize().await?;

    match cli.command {
        Commands::Sync => {
            let report = engine.sync().await?;
            println!(
                "sync: {} indexed, {} unchanged, {} failed, {} removed",
                report.indexed, report.unchanged, report.failed, report.removed
            );
        }

        Commands::Search { query, mode, top_k } => {
            let mode: SearchMode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            let hits = engine.search(&query, top_k, mode).await?;
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().enumerate() {
                let name = hit
                    .metadata
                    .as_ref()
                    .map(|m| m.file_name.clone())
                    .unwrap_or_else(|| hit.doc_id.clone());
                println!("{}. [{:.3}] {} #{}", i + 1, hit.score, name, hit.ordinal);
                println!("    {}", hit.text.replace('\n', " ").trim());
            }
        }

        Commands::Serve { no_initial_sync } => {
            if !no_initial_sync {
                let report = engine.sync().await?;
                println!(
                    "initial sync: {} indexed, {} unchanged, {} failed, {} removed",
                    report.indexed, report.unchanged, report.failed, report.removed
                );
            }
            let watch = WatchService::start(engine.clone())?;
            let result = run_server(engine.clone()).await;
            watch.stop().await;
            engine.shutdown().await;
            result?;
        }

        Commands::Status => {
            let info = engine.info().await;
            println!("state: {:?}", info.state);
            println!("healthy: {}", info.healthy);
            println!("documents: {}", info.documents_count);
            println!("chunks: {}", info.chunks_count);
            println!("model: {}", info.model_name);
        }

        Commands::Reindex { clear_cache } => {
            let report = engine.reindex(clear_cache).await?;
            println!(
                "reindex: {} indexed, {} failed, {} removed",
                report.indexed, report.failed, report.removed
            );
        }
    }

    Ok(())
}
