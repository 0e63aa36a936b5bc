//! Durable manifest store.
//!
//! The manifest is a single JSON document mapping source path to its last
//! processed state. It is the only piece of state shared between runs, so
//! saves go through a sibling temp file and a rename; a crash mid-save can
//! never leave a truncated manifest behind.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::models::Manifest;

pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing manifest file is an empty manifest (first run).
    pub fn load(&self) -> Result<Manifest> {
        if !self.path.exists() {
            return Ok(Manifest::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read manifest: {}", self.path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", self.path.display()))?;
        Ok(manifest)
    }

    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create manifest directory: {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(manifest)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write manifest temp file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace manifest: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileStatus, ManifestEntry};

    fn entry() -> ManifestEntry {
        ManifestEntry {
            modified_time: "2024-06-01T12:00:00+00:00".to_string(),
            file_hash: Some("abc123".to_string()),
            file_size: 2048,
            chunk_count: 7,
            status: FileStatus::Processed,
        }
    }

    #[test]
    fn missing_manifest_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("manifest.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ManifestStore::new(dir.path().join("state/manifest.json"));

        let mut manifest = Manifest::new();
        manifest.insert("/docs/a.pdf".to_string(), entry());
        store.save(&manifest).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn save_replaces_atomically_leaving_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let store = ManifestStore::new(&path);

        let mut manifest = Manifest::new();
        manifest.insert("/docs/a.pdf".to_string(), entry());
        store.save(&manifest).unwrap();

        let mut updated = entry();
        updated.chunk_count = 9;
        updated.status = FileStatus::Failed;
        manifest.insert("/docs/a.pdf".to_string(), updated);
        store.save(&manifest).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        let loaded = store.load().unwrap();
        assert_eq!(loaded["/docs/a.pdf"].chunk_count, 9);
        assert_eq!(loaded["/docs/a.pdf"].status, FileStatus::Failed);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&entry()).unwrap();
        assert!(json.contains("\"status\":\"processed\""));
        assert!(json.contains("\"modified_time\""));
    }
}
