//! # docsync CLI
//!
//! The `docsync` binary drives the ingestion pipeline. It reads a TOML
//! configuration file, scans the configured source tree, and keeps the
//! external index in step with it.
//!
//! ## Usage
//!
//! ```bash
//! docsync --config ./docsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsync sync` | Process new and modified files end to end |
//! | `docsync scan` | Classify files against the manifest without processing |
//! | `docsync status` | Summarize the manifest |
//!
//! ## Examples
//!
//! ```bash
//! # See what changed since the last run
//! docsync scan --config ./docsync.toml
//!
//! # Incremental sync
//! docsync sync --config ./docsync.toml
//!
//! # Reprocess everything from scratch
//! docsync sync --full --config ./docsync.toml
//!
//! # Classify only, touch nothing
//! docsync sync --dry-run --config ./docsync.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use docsync::classify::classify;
use docsync::config::{self, Config};
use docsync::extract::DefaultExtractor;
use docsync::index_writer::HttpIndexClient;
use docsync::manifest::ManifestStore;
use docsync::models::FileStatus;
use docsync::pipeline::{run_sync, SyncContext, SyncOptions};
use docsync::scanner::scan_source_tree;

/// docsync — an incremental document ingestion and indexing pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file describing the source tree, chunking parameters, index endpoint,
/// and manifest location.
#[derive(Parser)]
#[command(
    name = "docsync",
    about = "docsync — incremental document ingestion and indexing pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Process new and modified files end to end.
    ///
    /// Scans the source tree, diffs it against the manifest, then extracts,
    /// normalizes, chunks, tags, and indexes every new or modified file.
    /// Each file is checkpointed to the manifest as soon as the index
    /// acknowledges all of its chunks.
    Sync {
        /// Ignore the manifest — reprocess every file from scratch.
        #[arg(long)]
        full: bool,

        /// Scan and classify only; no extraction, no network calls, no
        /// manifest writes.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of files to process in this run.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Classify files against the manifest without processing anything.
    Scan,

    /// Summarize the manifest: entry counts by status and recorded chunks.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("docsync=info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync {
            full,
            dry_run,
            limit,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        eprintln!("shutdown requested, finishing in-flight files");
                        shutdown.store(true, Ordering::Relaxed);
                    }
                });
            }

            let ctx = SyncContext {
                extractor: Arc::new(DefaultExtractor),
                index: Arc::new(HttpIndexClient::new(&cfg.index)?),
                config: Arc::new(cfg),
                shutdown,
            };
            run_sync(&ctx, SyncOptions {
                full,
                dry_run,
                limit,
            })
            .await?;
        }
        Commands::Scan => run_scan(&cfg)?,
        Commands::Status => run_status(&cfg)?,
    }

    Ok(())
}

fn run_scan(cfg: &Config) -> anyhow::Result<()> {
    let store = ManifestStore::new(&cfg.manifest.path);
    let manifest = store.load()?;
    let scanned = scan_source_tree(&cfg.source)?;
    let changes = classify(&scanned, &manifest);

    println!("scan");
    println!("  scanned: {} files", scanned.len());
    for file in &changes.new {
        println!("  new: {}", file.path.display());
    }
    for file in &changes.modified {
        println!("  modified: {}", file.path.display());
    }
    for path in &changes.deleted {
        println!("  deleted (detected only): {path}");
    }
    println!("  unchanged: {}", changes.unchanged);
    println!("ok");
    Ok(())
}

fn run_status(cfg: &Config) -> anyhow::Result<()> {
    let store = ManifestStore::new(&cfg.manifest.path);
    let manifest = store.load()?;
    let processed = manifest
        .values()
        .filter(|e| e.status == FileStatus::Processed)
        .count();
    let failed = manifest.len() - processed;
    let chunks: usize = manifest.values().map(|e| e.chunk_count).sum();

    println!("status");
    println!("  manifest: {}", store.path().display());
    println!(
        "  entries: {} ({} processed, {} failed)",
        manifest.len(),
        processed,
        failed
    );
    println!("  chunks recorded: {}", chunks);
    println!("ok");
    Ok(())
}
