//! Overlapping-window text chunker.
//!
//! Splits normalized document text into [`Chunk`]s of at most `max_chars`
//! characters. Boundaries are chosen by scanning backwards from the window
//! edge in priority order: paragraph break (`\n\n`), then line break (`\n`),
//! then whitespace, then a hard character cut. Each chunk after the first
//! starts exactly `overlap` characters before the end of its predecessor so
//! context is never lost at a boundary.
//!
//! All offsets are in characters, not bytes, so multi-byte Hangul text can
//! never be cut mid-codepoint.

use crate::models::Chunk;

/// Split text into overlapping chunks. Returns chunks with contiguous
/// indices starting at 0; whitespace-only input yields no chunks at all.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    if max_chars == 0 || text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let overlap = overlap.min(max_chars - 1);

    if total <= max_chars {
        return vec![make_chunk(&chars, 0, 0, total)];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        if total - start <= max_chars {
            chunks.push(make_chunk(&chars, chunks.len(), start, total));
            break;
        }

        let window_end = start + max_chars;
        // Every chunk must reach past the shared overlap or the walk stalls.
        let min_end = start + overlap + 1;
        let end = find_boundary(&chars, min_end, window_end);
        chunks.push(make_chunk(&chars, chunks.len(), start, end));
        start = end - overlap;
    }

    chunks
}

/// Best cut position in `(min_end, window_end]`, highest separator priority
/// first, rightmost position within each priority.
fn find_boundary(chars: &[char], min_end: usize, window_end: usize) -> usize {
    let mut j = window_end;
    while j > min_end {
        if j >= 2 && chars[j - 1] == '\n' && chars[j - 2] == '\n' {
            return j;
        }
        j -= 1;
    }
    let mut j = window_end;
    while j > min_end {
        if chars[j - 1] == '\n' {
            return j;
        }
        j -= 1;
    }
    let mut j = window_end;
    while j > min_end {
        if chars[j - 1].is_whitespace() {
            return j;
        }
        j -= 1;
    }
    window_end
}

fn make_chunk(chars: &[char], index: usize, start: usize, end: usize) -> Chunk {
    Chunk {
        index,
        text: chars[start..end].iter().collect(),
        start,
        end,
    }
}
