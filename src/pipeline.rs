//! Sync orchestration.
//!
//! Coordinates the full flow: scan → classify → per-file extract,
//! normalize, chunk, tag, index → manifest checkpoint. Files are processed
//! by a bounded pool of workers; the manifest is loaded once and written
//! only from the orchestrating task, right after each file completes, so a
//! crash loses at most the file that was in flight.
//!
//! Failure isolation: one broken file is recorded and skipped; the run
//! aborts only on a fatal index error or a manifest persistence error.

use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::artifacts;
use crate::chunker::chunk_text;
use crate::classify::classify;
use crate::config::Config;
use crate::extract::ContentExtractor;
use crate::index_writer::{hash_text, record_id, IndexClient, IndexError, IndexWriter};
use crate::manifest::ManifestStore;
use crate::metadata::build_metadata;
use crate::models::{
    FileStatus, IndexRecord, Manifest, ManifestEntry, RunSummary, ScannedFile,
};
use crate::normalize::normalize;
use crate::scanner;

/// Everything a sync run needs, constructed once by the caller. The
/// extractor and index client sit behind traits so tests can run the whole
/// pipeline against fakes.
pub struct SyncContext {
    pub config: Arc<Config>,
    pub extractor: Arc<dyn ContentExtractor>,
    pub index: Arc<dyn IndexClient>,
    /// Set externally (Ctrl-C) to stop dispatching new files. In-flight
    /// files always finish so the manifest stays consistent.
    pub shutdown: Arc<AtomicBool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the manifest and reprocess everything.
    pub full: bool,
    /// Classify only: no extraction, no network, no manifest writes.
    pub dry_run: bool,
    pub limit: Option<usize>,
}

pub async fn run_sync(ctx: &SyncContext, opts: SyncOptions) -> Result<RunSummary> {
    let config = &ctx.config;
    let store = ManifestStore::new(&config.manifest.path);
    let mut manifest = if opts.full {
        Manifest::new()
    } else {
        store.load()?
    };

    let scanned = scanner::scan_source_tree(&config.source)?;
    let mut changes = classify(&scanned, &manifest);

    let mut summary = RunSummary {
        scanned: scanned.len(),
        new: changes.new.len(),
        modified: changes.modified.len(),
        deleted: changes.deleted.len(),
        unchanged: changes.unchanged,
        ..Default::default()
    };

    for path in &changes.deleted {
        warn!(path = %path, "source file deleted; its index entries are retained");
    }

    let mut to_process: Vec<ScannedFile> = changes
        .new
        .drain(..)
        .chain(changes.modified.drain(..))
        .collect();
    if let Some(limit) = opts.limit {
        to_process.truncate(limit);
    }

    if opts.dry_run {
        print_summary(&summary, true, true);
        return Ok(summary);
    }

    let mut queue = to_process.into_iter();
    let mut pool: JoinSet<FileOutcome> = JoinSet::new();
    let mut fatal: Option<IndexError> = None;

    loop {
        while fatal.is_none()
            && !ctx.shutdown.load(Ordering::Relaxed)
            && pool.len() < config.pipeline.concurrency
        {
            let Some(file) = queue.next() else { break };
            let worker = Worker {
                config: Arc::clone(&ctx.config),
                extractor: Arc::clone(&ctx.extractor),
                index: Arc::clone(&ctx.index),
            };
            pool.spawn(async move { worker.process_file(file).await });
        }

        let Some(joined) = pool.join_next().await else {
            break;
        };
        let outcome = joined?;

        match outcome.result {
            Ok(done) => {
                summary.processed += 1;
                summary.chunks_indexed += done.chunk_count as u64;
                manifest.insert(outcome.key, done.entry);
                store.save(&manifest)?;
            }
            Err(FileFailure::Fatal(err)) => {
                summary.failed += 1;
                summary.errors.push((outcome.key, err.to_string()));
                // Stop dispatching; in-flight workers drain before we bail.
                fatal = Some(err);
            }
            Err(FileFailure::Skip { entry, message }) => {
                warn!(path = %outcome.key, error = %message, "file failed, continuing");
                summary.failed += 1;
                summary.errors.push((outcome.key.clone(), message));
                if let Some(entry) = entry {
                    manifest.insert(outcome.key, entry);
                    store.save(&manifest)?;
                }
            }
        }
    }

    if ctx.shutdown.load(Ordering::Relaxed) && queue.len() > 0 {
        info!(
            remaining = queue.len(),
            "shutdown requested; remaining files left for the next run"
        );
    }

    print_summary(&summary, false, fatal.is_none());

    if let Some(err) = fatal {
        bail!("run aborted: {err}");
    }
    Ok(summary)
}

struct Worker {
    config: Arc<Config>,
    extractor: Arc<dyn ContentExtractor>,
    index: Arc<dyn IndexClient>,
}

struct FileOutcome {
    key: String,
    result: Result<FileDone, FileFailure>,
}

struct FileDone {
    chunk_count: usize,
    entry: ManifestEntry,
}

enum FileFailure {
    /// Aborts the run.
    Fatal(IndexError),
    /// Fails this file only. The entry, when present, records the failure
    /// so the next run retries the file.
    Skip {
        entry: Option<ManifestEntry>,
        message: String,
    },
}

impl Worker {
    async fn process_file(self, file: ScannedFile) -> FileOutcome {
        let key = file.path.to_string_lossy().to_string();
        let result = self.process_inner(&file).await;
        FileOutcome { key, result }
    }

    async fn process_inner(&self, file: &ScannedFile) -> Result<FileDone, FileFailure> {
        let config = &self.config;
        info!(path = %file.path.display(), "processing");

        let raw = self.extractor.extract(&file.path).map_err(|err| {
            FileFailure::Skip {
                entry: Some(failed_entry(file, 0)),
                message: format!("extraction failed: {err}"),
            }
        })?;

        let text = normalize(&raw);
        let chunks = chunk_text(
            &text,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
        );

        if let Some(dir) = &config.pipeline.artifacts_dir {
            // Artifacts are a debugging aid; losing one never fails the file.
            if let Err(err) = artifacts::write_artifact(dir, &file.path, &text) {
                warn!(path = %file.path.display(), error = %err, "failed to write artifact");
            }
        }

        let meta = build_metadata(&file.path, &text, &config.metadata);
        let source_path = file.path.to_string_lossy();
        let records: Vec<IndexRecord> = chunks
            .iter()
            .map(|chunk| {
                let chunk_hash = hash_text(&chunk.text);
                IndexRecord {
                    id: record_id(&source_path, chunk.index, &chunk_hash),
                    text: chunk.text.clone(),
                    metadata: meta.clone(),
                }
            })
            .collect();

        let writer = IndexWriter::new(Arc::clone(&self.index), &config.index);
        let report = match writer.write(&records).await {
            Ok(report) => report,
            Err(failure) => {
                // The failed entry keeps the acknowledged count so status
                // reporting stays truthful about partially indexed files.
                return Err(match failure.source {
                    err @ IndexError::Fatal(_) => FileFailure::Fatal(err),
                    err => FileFailure::Skip {
                        entry: Some(failed_entry(file, failure.written)),
                        message: err.to_string(),
                    },
                });
            }
        };

        // "Processed" must mean every chunk was acknowledged.
        if report.failed > 0 {
            return Err(FileFailure::Skip {
                entry: Some(failed_entry(file, report.written)),
                message: format!(
                    "{} of {} chunks rejected by the index",
                    report.failed,
                    records.len()
                ),
            });
        }

        Ok(FileDone {
            chunk_count: records.len(),
            entry: ManifestEntry {
                modified_time: file.mtime.to_rfc3339(),
                file_hash: file.hash.clone(),
                file_size: file.size,
                chunk_count: records.len(),
                status: FileStatus::Processed,
            },
        })
    }
}

fn failed_entry(file: &ScannedFile, chunk_count: usize) -> ManifestEntry {
    ManifestEntry {
        modified_time: file.mtime.to_rfc3339(),
        file_hash: file.hash.clone(),
        file_size: file.size,
        chunk_count,
        status: FileStatus::Failed,
    }
}

fn print_summary(summary: &RunSummary, dry_run: bool, ok: bool) {
    if dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  scanned: {} files", summary.scanned);
    println!(
        "  new: {}  modified: {}  deleted: {} (detected only)",
        summary.new, summary.modified, summary.deleted
    );
    println!("  unchanged: {}", summary.unchanged);
    if !dry_run {
        println!("  processed: {}", summary.processed);
        println!("  failed: {}", summary.failed);
        println!("  chunks indexed: {}", summary.chunks_indexed);
        if !summary.errors.is_empty() {
            println!("  errors:");
            for (path, message) in &summary.errors {
                println!("    {path}: {message}");
            }
        }
    }
    if ok {
        println!("ok");
    }
}
