//! Deterministic text repair applied between extraction and chunking.
//!
//! Three passes run in a fixed order:
//!
//! 1. glyph substitution — a fixed table of known-garbled extraction glyphs
//! 2. duplicate-run collapse — folds back-to-back repeated Hangul runs that
//!    legacy converters emit for embedded-font documents
//! 3. vocabulary expansion — annotates standalone domain abbreviations with
//!    their expansion so keyword retrieval hits both forms
//!
//! Every pass is pure; normalizing already-normalized text is a no-op.

/// Known-bad glyph sequences and their replacements. Sources: CP949/HWP
/// extraction artifacts and full-width punctuation from office exports.
const GLYPH_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("\u{FFFD}", ""),
    ("\u{00A0}", " "),
    ("\u{200B}", ""),
    ("“", "\""),
    ("”", "\""),
    ("‘", "'"),
    ("’", "'"),
    ("–", "-"),
    ("—", "-"),
    ("．", "."),
    ("，", ","),
    ("：", ":"),
    ("（", "("),
    ("）", ")"),
];

/// Standalone abbreviations annotated with their domain expansion. A term is
/// left alone when its expansion already appears in the text, so the pass is
/// idempotent.
const VOCAB_EXPANSIONS: &[(&str, &str)] = &[
    ("PDT", "PDT(광역동치료)"),
    ("HMA", "HMA(호텔위탁운영계약)"),
    ("TSA", "TSA(기술지원계약)"),
    ("STO", "STO(토큰증권발행)"),
    ("RWA", "RWA(실물연계자산)"),
    ("IRR", "IRR(내부수익률)"),
    ("NPV", "NPV(순현재가치)"),
];

pub fn normalize(text: &str) -> String {
    let text = substitute_glyphs(text);
    let text = collapse_repeated_runs(&text);
    expand_vocabulary(&text)
}

fn substitute_glyphs(text: &str) -> String {
    let mut out = text.to_string();
    for (bad, good) in GLYPH_SUBSTITUTIONS {
        if out.contains(bad) {
            out = out.replace(bad, good);
        }
    }
    out
}

fn is_hangul(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Folds `SS` to `S` for any Hangul run `S` of two or more characters.
///
/// Matching is leftmost and greedy (longest repeat first), mirroring the
/// substitution `([가-힣]{2,})\1 → \1` the legacy converter applied. Only
/// maximal Hangul runs are examined, so Latin text and digits pass through
/// untouched.
pub fn collapse_repeated_runs(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        if !is_hangul(chars[i]) {
            out.push(chars[i]);
            i += 1;
            continue;
        }

        let mut run_end = i;
        while run_end < chars.len() && is_hangul(chars[run_end]) {
            run_end += 1;
        }

        let mut pos = i;
        while pos < run_end {
            let remaining = run_end - pos;
            let mut len = remaining / 2;
            let mut matched = false;
            while len >= 2 {
                if chars[pos..pos + len] == chars[pos + len..pos + 2 * len] {
                    out.extend(&chars[pos..pos + len]);
                    pos += 2 * len;
                    matched = true;
                    break;
                }
                len -= 1;
            }
            if !matched {
                out.push(chars[pos]);
                pos += 1;
            }
        }

        i = run_end;
    }

    out
}

fn expand_vocabulary(text: &str) -> String {
    let mut out = text.to_string();
    for (term, expansion) in VOCAB_EXPANSIONS {
        if out.contains(expansion) {
            continue;
        }
        if out.contains(term) {
            out = replace_standalone(&out, term, expansion);
        }
    }
    out
}

/// Replaces occurrences of `term` not adjacent to an ASCII alphanumeric, so
/// `PDT` expands but `PDTX` and `UPDT` do not.
fn replace_standalone(text: &str, term: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find(term) {
        let prev = if idx > 0 {
            rest[..idx].chars().next_back()
        } else {
            out.chars().next_back()
        };
        let next = rest[idx + term.len()..].chars().next();
        let standalone = prev.map_or(true, |c| !c.is_ascii_alphanumeric())
            && next.map_or(true, |c| !c.is_ascii_alphanumeric());

        out.push_str(&rest[..idx]);
        out.push_str(if standalone { replacement } else { term });
        rest = &rest[idx + term.len()..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_duplicated_hangul_run() {
        assert_eq!(collapse_repeated_runs("신축사업축사업"), "신축사업");
        assert_eq!(collapse_repeated_runs("호텔호텔 개발"), "호텔 개발");
    }

    #[test]
    fn leaves_non_duplicated_text_alone() {
        assert_eq!(collapse_repeated_runs("신축사업"), "신축사업");
        assert_eq!(collapse_repeated_runs("hello world 2024"), "hello world 2024");
    }

    #[test]
    fn collapse_does_not_cross_non_hangul_boundaries() {
        // The repeat is interrupted by a space, so nothing folds.
        assert_eq!(collapse_repeated_runs("사업 사업"), "사업 사업");
    }

    #[test]
    fn substitutes_known_glyphs() {
        assert_eq!(substitute_glyphs("“인용”—끝\u{FFFD}"), "\"인용\"-끝");
        assert_eq!(substitute_glyphs("（주）"), "(주)");
    }

    #[test]
    fn expands_standalone_abbreviations_only() {
        assert_eq!(expand_vocabulary("PDT 시술"), "PDT(광역동치료) 시술");
        assert_eq!(expand_vocabulary("PDTX 장비"), "PDTX 장비");
        assert_eq!(expand_vocabulary("UPDT"), "UPDT");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("신축사업축사업 PDT “테스트”");
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert_eq!(once, "신축사업 PDT(광역동치료) \"테스트\"");
    }
}
