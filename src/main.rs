//! # rag CLI
//!
//! The `rag` binary drives the retrieval engine: it chunks documents, builds
//! and rebuilds the flat index, runs searches, assembles answer contexts and
//! serves the JSON API.
//!
//! ## Usage
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest <dir>` | Chunk a documents directory and build the index |
//! | `rag build` | Re-embed the stored chunks and rebuild the index |
//! | `rag reindex` | Rebuild the index from the stored embedding matrix |
//! | `rag search "<query>"` | Search the index |
//! | `rag ask "<query>"` | Print the answer context and its sources |
//! | `rag summarize <file>...` | Extractive summaries of text files |
//! | `rag serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragcore::{commands, config, server};

/// Retrieval engine for question answering over a document corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; the file is optional and environment variables override it.
#[derive(Parser)]
#[command(
    name = "rag",
    about = "Chunk, embed, index and search a document corpus for retrieval-augmented answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rag.toml`. A missing file means built-in
    /// defaults plus environment overrides.
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk every document under a directory and build the index.
    ///
    /// Replaces the stored corpus, embedding matrix and index.
    Ingest {
        /// Documents directory.
        dir: PathBuf,
    },

    /// Re-embed the stored chunks and rebuild the index.
    Build,

    /// Rebuild the index from the stored embedding matrix without calling
    /// the embedding provider.
    Reindex,

    /// Search the index.
    Search {
        /// Query text.
        query: String,

        /// Number of results (default: `retrieval.search_k`).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve the answer context for a question.
    Ask {
        /// Question text.
        query: String,

        /// Also print the generator prompt.
        #[arg(long)]
        prompt: bool,
    },

    /// Print extractive summaries of text files.
    Summarize {
        /// Files to summarize.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Summarize { files } = &cli.command {
        commands::run_summarize(files)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest { dir } => {
            commands::run_ingest(&cfg, &dir).await?;
        }
        Commands::Build => {
            commands::run_build(&cfg).await?;
        }
        Commands::Reindex => {
            commands::run_reindex(&cfg).await?;
        }
        Commands::Search { query, top_k, json } => {
            commands::run_search(&cfg, &query, top_k, json).await?;
        }
        Commands::Ask { query, prompt } => {
            commands::run_ask(&cfg, &query, prompt).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Summarize { .. } => {}
    }

    Ok(())
}
