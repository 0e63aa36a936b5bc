//! Core data models used throughout docsync.
//!
//! These types represent the files, chunks, and index records that flow
//! through the ingestion pipeline, plus the manifest entries that persist
//! between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A file discovered by the scanner during one run.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    /// Populated only when `source.verify_hash` is enabled.
    pub hash: Option<String>,
}

/// Terminal state of a file's last processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Processed,
    Failed,
}

/// Per-file checkpoint. The manifest file on disk is a JSON map of
/// source path to entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Last modification time of the source file, RFC 3339.
    pub modified_time: String,
    pub file_hash: Option<String>,
    pub file_size: u64,
    /// Chunks acknowledged by the index for this file.
    pub chunk_count: usize,
    pub status: FileStatus,
}

pub type Manifest = BTreeMap<String, ManifestEntry>;

/// Result of diffing a scan against the manifest.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub new: Vec<ScannedFile>,
    pub modified: Vec<ScannedFile>,
    /// Paths present in the manifest but absent from the scan. Reported
    /// only; nothing is ever removed from the index.
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

/// A bounded span of normalized text. Lives only while its file is being
/// processed; `start` and `end` are char offsets into the normalized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Tags attached to every index record. Tags that cannot be derived carry
/// the literal `"unknown"` rather than being omitted, so the index schema
/// stays stable across documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub source_path: String,
    pub year: String,
    pub doc_type: String,
    pub project: String,
    pub author: String,
    pub section: String,
}

/// One record submitted to the external index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Counters and errors accumulated over one sync run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub scanned: usize,
    pub new: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub processed: usize,
    pub failed: usize,
    pub chunks_indexed: u64,
    /// `(source path, message)` for each failed file.
    pub errors: Vec<(String, String)>,
}
