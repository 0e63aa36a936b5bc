//! Normalized-text artifacts.
//!
//! When configured, the pipeline mirrors each file's normalized text into an
//! artifacts directory for inspection and debugging. Every artifact gets a
//! JSON sidecar naming its source; provenance never lives inside the text
//! itself, so the artifact body is exactly what the chunker saw. The
//! pipeline writes artifacts but never reads them back.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Provenance record written next to each artifact.
#[derive(Debug, Serialize, Deserialize)]
pub struct SidecarRecord {
    pub source_path: String,
    /// SHA-256 of the artifact body.
    pub content_hash: String,
    pub converted_at: String,
    pub artifact: String,
}

/// Writes `<stem>_<hash8>.txt` and its `<stem>_<hash8>.json` sidecar,
/// returning the artifact path. The hash suffix comes from the source path,
/// so same-named files in different directories never collide.
pub fn write_artifact(dir: &Path, source_path: &Path, text: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create artifacts directory: {}", dir.display()))?;

    let source = source_path.to_string_lossy();
    let path_hash8: String = hash_hex(source.as_bytes()).chars().take(8).collect();
    let name = format!("{}_{}", safe_stem(source_path), path_hash8);

    let artifact = dir.join(format!("{name}.txt"));
    std::fs::write(&artifact, text)
        .with_context(|| format!("Failed to write artifact: {}", artifact.display()))?;

    let sidecar = SidecarRecord {
        source_path: source.to_string(),
        content_hash: hash_hex(text.as_bytes()),
        converted_at: Utc::now().to_rfc3339(),
        artifact: format!("{name}.txt"),
    };
    let sidecar_path = dir.join(format!("{name}.json"));
    std::fs::write(&sidecar_path, serde_json::to_string_pretty(&sidecar)?)
        .with_context(|| format!("Failed to write sidecar: {}", sidecar_path.display()))?;

    Ok(artifact)
}

fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// File stem with filesystem-hostile characters dropped, capped at 40 chars.
fn safe_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "artifact".to_string());
    let cleaned: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.'))
        .take(40)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "artifact".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_artifact_and_matching_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let source = Path::new("/docs/사업계획_2021.pdf");
        let artifact = write_artifact(dir.path(), source, "normalized body").unwrap();

        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "normalized body");

        let sidecar_path = artifact.with_extension("json");
        let sidecar: SidecarRecord =
            serde_json::from_str(&std::fs::read_to_string(sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar.source_path, "/docs/사업계획_2021.pdf");
        assert_eq!(sidecar.content_hash, hash_hex(b"normalized body"));
        assert_eq!(
            sidecar.artifact,
            artifact.file_name().unwrap().to_string_lossy()
        );
        // Provenance lives in the sidecar, never in the artifact body.
        assert!(!std::fs::read_to_string(&artifact).unwrap().contains("Source:"));
    }

    #[test]
    fn same_name_different_directory_gets_distinct_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_artifact(dir.path(), Path::new("/a/report.pdf"), "one").unwrap();
        let b = write_artifact(dir.path(), Path::new("/b/report.pdf"), "two").unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
    }

    #[test]
    fn hostile_characters_are_dropped_from_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        let artifact =
            write_artifact(dir.path(), Path::new("/docs/q3: plan?*<final>.txt"), "x").unwrap();
        let name = artifact.file_name().unwrap().to_string_lossy().to_string();
        for bad in [':', '?', '*', '<', '>'] {
            assert!(!name.contains(bad), "{name} contains {bad}");
        }
    }
}
