use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::models::ScannedFile;

/// Walks the source tree and returns every ingestible file, sorted by path.
///
/// A single unreadable entry never fails the scan; it is logged and skipped
/// so one broken symlink cannot stall ingestion of everything else.
pub fn scan_source_tree(config: &SourceConfig) -> Result<Vec<ScannedFile>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Source root does not exist: {}", root.display());
    }

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/~$*".to_string(),
        "**/.~*".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !has_supported_extension(path, &config.extensions) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }

        match stat_file(path, config.verify_hash) {
            Ok(file) => files.push(file),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable file");
            }
        }
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(files)
}

fn has_supported_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    extensions
        .iter()
        .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

fn stat_file(path: &Path, verify_hash: bool) -> Result<ScannedFile> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
    let mtime: DateTime<Utc> = modified.into();

    let hash = if verify_hash {
        Some(hash_file(path)?)
    } else {
        None
    };

    Ok(ScannedFile {
        path: path.to_path_buf(),
        size: metadata.len(),
        mtime,
        hash,
    })
}

/// SHA-256 of the file contents, lowercase hex.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    fn source_config(root: &Path) -> SourceConfig {
        SourceConfig {
            root: root.to_path_buf(),
            extensions: vec!["txt".to_string(), "pdf".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
            verify_hash: false,
        }
    }

    #[test]
    fn scans_only_supported_extensions_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.pdf"), "a").unwrap();
        std::fs::write(dir.path().join("c.log"), "c").unwrap();
        std::fs::write(dir.path().join("noext"), "d").unwrap();

        let files = scan_source_tree(&source_config(dir.path())).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.txt"]);
    }

    #[test]
    fn skips_office_lock_files_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("~$report.txt"), "lock").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "keep").unwrap();
        std::fs::create_dir(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/skip.txt"), "skip").unwrap();

        let mut config = source_config(dir.path());
        config.exclude_globs = vec!["drafts/**".to_string()];
        let files = scan_source_tree(&config).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("keep.txt"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        assert!(scan_source_tree(&source_config(&gone)).is_err());
    }

    #[test]
    fn verify_hash_populates_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let mut config = source_config(dir.path());
        config.verify_hash = true;
        let files = scan_source_tree(&config).unwrap();
        assert_eq!(files.len(), 1);
        let hash = files[0].hash.as_deref().unwrap();
        assert_eq!(hash.len(), 64);
        assert_eq!(files[0].size, 5);
    }
}
