//! # memvault CLI
//!
//! The `memvault` binary ingests text files and chat exports into a
//! structured memory store: content is chunked, embedded, and inserted
//! idempotently, with a durable progress file so interrupted runs resume
//! where they left off.
//!
//! ## Usage
//!
//! ```bash
//! memvault --config ./memvault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `memvault ingest <path>` | Ingest a file, folder, or chat export folder |
//! | `memvault status` | Show ingestion progress from the progress file |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest a single markdown file
//! memvault ingest ./notes/postgres.md --source documentation
//!
//! # Ingest a chat export folder (contains conversations.json)
//! memvault ingest ~/exports/chat --summarize
//!
//! # Preview without touching the network or the progress file
//! memvault ingest ./docs --dry-run
//!
//! # Start over from scratch
//! memvault ingest ./docs --reset
//!
//! # Check where a run left off
//! memvault status
//! ```

mod chunk;
mod config;
mod embedding;
mod error;
mod export;
mod fingerprint;
mod ingest;
mod ledger;
mod models;
mod report;
mod sources;
mod status;
mod store;
mod summarize;
mod writer;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use report::ProgressMode;

/// memvault CLI — a resumable batch pipeline for ingesting text and chat
/// history into an embedded memory store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/memvault.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "memvault",
    about = "memvault — resumable ingestion of text and chat history into a memory store",
    version,
    long_about = "memvault chunks text files and chat exports into token-bounded pieces, \
    embeds them through a rate-limited external service, and inserts them idempotently into \
    a memory store. A durable progress file makes every run resumable: rerun the same command \
    after a crash or interrupt and only unfinished work is redone."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./memvault.toml`. Ledger, chunking, embedding, store,
    /// and batching settings are read from this file. API keys are read
    /// from the environment variables the config names.
    #[arg(long, global = true, default_value = "./memvault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest a file or folder into the memory store.
    ///
    /// Accepts a single text file (.txt, .md, .json), a folder of such
    /// files (scanned recursively), or a chat export folder containing
    /// `conversations.json`. Content is chunked, embedded, and inserted;
    /// completed work is recorded in the progress file so rerunning the
    /// same command resumes instead of duplicating.
    Ingest {
        /// File or folder to ingest.
        path: PathBuf,

        /// Override the detected source label (e.g. `documentation`, `notes`).
        #[arg(long)]
        source: Option<String>,

        /// Comma-separated tags applied to every chunk, replacing generated ones.
        #[arg(long)]
        tags: Option<String>,

        /// Importance for text content, 1 (low) to 5 (critical).
        /// Chat messages score their own importance from content.
        #[arg(long, default_value_t = 1)]
        importance: u8,

        /// Summarize long chunks with a chat model before storing.
        #[arg(long)]
        summarize: bool,

        /// Delete the progress file first — reingest everything from scratch.
        #[arg(long)]
        reset: bool,

        /// Use this progress file instead of the configured one.
        #[arg(long)]
        progress_file: Option<PathBuf>,

        /// Show unit and chunk counts without calling any service or
        /// writing the progress file.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of source units to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output: `human`, `json`, or `off`. Defaults to `human`
        /// when stderr is a terminal, `off` otherwise.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Show ingestion progress.
    ///
    /// Reads the progress file and prints completed unit and chunk counts
    /// plus the last session's outcome tallies. Read-only.
    Status {
        /// Use this progress file instead of the configured one.
        #[arg(long)]
        progress_file: Option<PathBuf>,
    },
}

fn parse_progress_mode(raw: Option<&str>) -> anyhow::Result<ProgressMode> {
    match raw {
        None => Ok(ProgressMode::default_for_tty()),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some("off") => Ok(ProgressMode::Off),
        Some(other) => anyhow::bail!(
            "Unknown progress mode '{}': expected human, json, or off",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Status {
        progress_file: Some(path),
    } = &cli.command
    {
        status::run_status(path)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest {
            path,
            source,
            tags,
            importance,
            summarize,
            reset,
            progress_file,
            dry_run,
            limit,
            progress,
        } => {
            let importance = config::validate_importance(importance)?;
            let args = ingest::IngestArgs {
                path,
                source,
                tags: tags.as_deref().map(config::parse_tags),
                importance,
                summarize,
                reset,
                progress_file,
                dry_run,
                limit,
                progress_mode: parse_progress_mode(progress.as_deref())?,
            };
            let summary = ingest::run_ingest(&cfg, args).await?;
            if summary.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Status { progress_file } => {
            let path = progress_file.unwrap_or_else(|| cfg.ledger.path.clone());
            status::run_status(&path)?;
        }
    }

    Ok(())
}
