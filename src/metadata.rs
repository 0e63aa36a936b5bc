//! Per-chunk tag derivation.
//!
//! Tags come from the file name, extension, and a bounded window of leading
//! text. Anything that cannot be derived gets the literal `"unknown"` so
//! every record carries the same metadata keys.

use std::path::Path;

use crate::config::MetadataConfig;
use crate::models::ChunkMetadata;

pub const UNKNOWN: &str = "unknown";

pub fn build_metadata(path: &Path, text: &str, config: &MetadataConfig) -> ChunkMetadata {
    let source = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let year = infer_year(path, text, config.year_scan_chars)
        .unwrap_or_else(|| UNKNOWN.to_string());

    ChunkMetadata {
        source,
        source_path: path.to_string_lossy().to_string(),
        year,
        doc_type: doc_type_for(path),
        project: config.project.clone(),
        author: UNKNOWN.to_string(),
        section: UNKNOWN.to_string(),
    }
}

fn doc_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") | Some("docx") => "report",
        Some("pptx") => "slides",
        Some("xlsx") => "spreadsheet",
        Some("txt") | Some("md") => "text",
        _ => UNKNOWN,
    }
    .to_string()
}

/// First plausible four-digit year, searching the file name before the
/// leading `scan_chars` characters of the document text.
fn infer_year(path: &Path, text: &str, scan_chars: usize) -> Option<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    find_year(&name).or_else(|| {
        let head: String = text.chars().take(scan_chars).collect();
        find_year(&head)
    })
}

fn find_year(s: &str) -> Option<String> {
    let chars: Vec<char> = s.chars().collect();
    for window in chars.windows(4) {
        let century = (window[0] == '1' && window[1] == '9') || (window[0] == '2' && window[1] == '0');
        if century && window.iter().all(|c| c.is_ascii_digit()) {
            return Some(window.iter().collect());
        }
    }
    None
}
