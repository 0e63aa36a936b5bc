//! Change detection: diffs a scan against the manifest.
//!
//! Every scanned file lands in exactly one bucket. Files whose last attempt
//! failed are reclassified as modified so they are retried on the next run
//! without a separate retry queue.

use std::collections::BTreeSet;

use crate::models::{ChangeSet, FileStatus, Manifest, ManifestEntry, ScannedFile};

pub fn classify(scanned: &[ScannedFile], manifest: &Manifest) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen = BTreeSet::new();

    for file in scanned {
        let key = file.path.to_string_lossy().to_string();
        seen.insert(key.clone());
        match manifest.get(&key) {
            None => changes.new.push(file.clone()),
            Some(entry) if is_modified(file, entry) => changes.modified.push(file.clone()),
            Some(_) => changes.unchanged += 1,
        }
    }

    for path in manifest.keys() {
        if !seen.contains(path) {
            changes.deleted.push(path.clone());
        }
    }

    changes
}

fn is_modified(file: &ScannedFile, entry: &ManifestEntry) -> bool {
    if entry.status == FileStatus::Failed {
        return true;
    }
    if file.size != entry.file_size {
        return true;
    }
    // Content hashes only compare when both sides have one.
    match (&file.hash, &entry.file_hash) {
        (Some(scanned), Some(recorded)) => scanned != recorded,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn scanned(path: &str, size: u64, hash: Option<&str>) -> ScannedFile {
        ScannedFile {
            path: PathBuf::from(path),
            size,
            mtime: Utc::now(),
            hash: hash.map(|h| h.to_string()),
        }
    }

    fn entry(size: u64, hash: Option<&str>, status: FileStatus) -> ManifestEntry {
        ManifestEntry {
            modified_time: "2024-01-01T00:00:00Z".to_string(),
            file_hash: hash.map(|h| h.to_string()),
            file_size: size,
            chunk_count: 3,
            status,
        }
    }

    #[test]
    fn buckets_are_disjoint_and_complete() {
        let mut manifest = Manifest::new();
        manifest.insert("/d/same.txt".to_string(), entry(5, None, FileStatus::Processed));
        manifest.insert("/d/grew.txt".to_string(), entry(5, None, FileStatus::Processed));
        manifest.insert("/d/gone.txt".to_string(), entry(5, None, FileStatus::Processed));

        let scan = vec![
            scanned("/d/fresh.txt", 10, None),
            scanned("/d/grew.txt", 9, None),
            scanned("/d/same.txt", 5, None),
        ];
        let changes = classify(&scan, &manifest);

        assert_eq!(changes.new.len(), 1);
        assert!(changes.new[0].path.ends_with("fresh.txt"));
        assert_eq!(changes.modified.len(), 1);
        assert!(changes.modified[0].path.ends_with("grew.txt"));
        assert_eq!(changes.deleted, vec!["/d/gone.txt".to_string()]);
        assert_eq!(changes.unchanged, 1);
    }

    #[test]
    fn same_size_different_hash_is_modified() {
        let mut manifest = Manifest::new();
        manifest.insert(
            "/d/a.txt".to_string(),
            entry(5, Some("aaaa"), FileStatus::Processed),
        );

        let changes = classify(&[scanned("/d/a.txt", 5, Some("bbbb"))], &manifest);
        assert_eq!(changes.modified.len(), 1);

        // Without a scan-side hash, equal size means unchanged.
        let changes = classify(&[scanned("/d/a.txt", 5, None)], &manifest);
        assert_eq!(changes.unchanged, 1);
    }

    #[test]
    fn failed_entries_are_retried_as_modified() {
        let mut manifest = Manifest::new();
        manifest.insert("/d/a.txt".to_string(), entry(5, None, FileStatus::Failed));

        let changes = classify(&[scanned("/d/a.txt", 5, None)], &manifest);
        assert_eq!(changes.modified.len(), 1);
        assert_eq!(changes.unchanged, 0);
    }

    #[test]
    fn empty_scan_reports_everything_deleted() {
        let mut manifest = Manifest::new();
        manifest.insert("/d/a.txt".to_string(), entry(5, None, FileStatus::Processed));
        manifest.insert("/d/b.txt".to_string(), entry(5, None, FileStatus::Processed));

        let changes = classify(&[], &manifest);
        assert_eq!(changes.deleted.len(), 2);
        assert!(changes.new.is_empty());
        assert!(changes.modified.is_empty());
    }
}
