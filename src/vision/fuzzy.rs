//! Fuzzy label matching over noisy recognized text
//!
//! OCR output from game frames drops characters, merges tokens and invents
//! glyphs. Matching happens in two passes: a strict pass (word boundaries
//! and in-token evidence) and a permissive per-label fallback used only
//! when the strict pass finds nothing at all.

use strsim::normalized_levenshtein;

/// A token longer than this is treated as a merged run of words.
const LONG_TOKEN_LEN: usize = 8;
/// Character-multiset similarity cutoff for in-token matches.
const MULTISET_CUTOFF: f64 = 0.8;
/// Sliding-window similarity cutoff for the permissive fallback.
const WINDOW_CUTOFF: f64 = 0.7;
/// In-order character coverage cutoff for the permissive fallback.
const COVERAGE_CUTOFF: f64 = 0.8;

/// Lowercase and strip to letters and spaces, collapsing runs of anything
/// else into a single space.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_space = true;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_lowercase() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim().to_string()
}

/// Count strict evidence for `label` in normalized text: exact
/// word-boundary hits plus tokens that carry the label inside them.
pub fn strict_count(text: &str, label: &str) -> usize {
    if label.is_empty() {
        return 0;
    }
    let mut count = 0;
    for token in text.split_whitespace() {
        if token == label {
            count += 1;
        } else if token_carries_label(token, label) {
            count += 1;
        }
    }
    count
}

/// Does a single token carry the label? Long tokens are merged word runs,
/// so only a prefix or suffix placement is trusted; short tokens accept any
/// substring. A near-anagram (character multiset overlap against average
/// length) also counts, which absorbs single dropped or swapped glyphs.
fn token_carries_label(token: &str, label: &str) -> bool {
    if token.len() <= label.len() {
        return multiset_similarity(token, label) >= MULTISET_CUTOFF;
    }
    let positional = if token.len() > LONG_TOKEN_LEN {
        token.starts_with(label) || token.ends_with(label)
    } else {
        token.contains(label)
    };
    positional || multiset_similarity(token, label) >= MULTISET_CUTOFF
}

/// Permissive single-occurrence test, used only when no label got strict
/// evidence. Checks plain substring, then a sliding window of the label's
/// length over the de-spaced text, then in-order character coverage.
pub fn permissive_match(text: &str, label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    if text.contains(label) {
        return true;
    }

    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.contains(label) {
        return true;
    }

    if best_window_similarity(&compact, label) >= WINDOW_CUTOFF {
        return true;
    }

    in_order_coverage(&compact, label) >= COVERAGE_CUTOFF
}

/// Character multiset overlap divided by the average of the two lengths.
pub fn multiset_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut counts = [0i32; 26];
    for c in a.bytes().filter(u8::is_ascii_lowercase) {
        counts[(c - b'a') as usize] += 1;
    }
    let mut overlap = 0i32;
    for c in b.bytes().filter(u8::is_ascii_lowercase) {
        let slot = &mut counts[(c - b'a') as usize];
        if *slot > 0 {
            *slot -= 1;
            overlap += 1;
        }
    }
    let avg_len = (a.len() + b.len()) as f64 / 2.0;
    overlap as f64 / avg_len
}

/// Best normalized Levenshtein similarity of `label` against every window
/// of its own length in `text`.
fn best_window_similarity(text: &str, label: &str) -> f64 {
    let text: Vec<char> = text.chars().collect();
    let len = label.chars().count();
    if text.len() < len {
        return normalized_levenshtein(&text.iter().collect::<String>(), label);
    }
    let mut best = 0.0f64;
    for start in 0..=(text.len() - len) {
        let window: String = text[start..start + len].iter().collect();
        best = best.max(normalized_levenshtein(&window, label));
    }
    best
}

/// Fraction of the label's characters found in order within the text.
fn in_order_coverage(text: &str, label: &str) -> f64 {
    if label.is_empty() {
        return 0.0;
    }
    let mut found = 0usize;
    let mut chars = text.chars();
    for lc in label.chars() {
        if chars.any(|tc| tc == lc) {
            found += 1;
        }
    }
    found as f64 / label.chars().count() as f64
}

/// Collapse a raw occurrence count: one or two sightings of the same label
/// are almost always the same on-screen name read twice, three or more is a
/// genuine multiple.
pub fn fold_count(raw: usize) -> usize {
    if raw <= 2 {
        1
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_to_letters_and_spaces() {
        assert_eq!(normalize("Wild PIDGEY Lv.12!"), "wild pidgey lv");
        assert_eq!(normalize("  a   b  "), "a b");
        assert_eq!(normalize("123!?"), "");
    }

    #[test]
    fn strict_counts_word_boundary_hits() {
        assert_eq!(strict_count("wild pidgey appeared", "pidgey"), 1);
        assert_eq!(strict_count("pidgey and pidgey and pidgey", "pidgey"), 3);
        assert_eq!(strict_count("wild rattata appeared", "pidgey"), 0);
    }

    #[test]
    fn strict_finds_label_inside_merged_token() {
        // OCR merged the level prefix and suffix into one long token.
        assert_eq!(strict_count("wild pidgeottolv", "pidgeotto"), 1);
        // Near-anagram with one stray leading glyph.
        assert_eq!(strict_count("wild ipidgeottolv", "pidgeotto"), 1);
    }

    #[test]
    fn long_token_middle_substring_not_trusted() {
        // "abra" buried mid-token in a long run is not positional evidence
        // and the multiset similarity of the whole token is too low.
        assert_eq!(strict_count("xxxxabraxxxx", "abra"), 0);
        // But a short token accepts any substring placement.
        assert_eq!(strict_count("xabrax", "abra"), 1);
    }

    #[test]
    fn multiset_similarity_examples() {
        assert!(multiset_similarity("pidgeottolv", "pidgeotto") >= 0.8);
        assert!(multiset_similarity("pidgeottolv", "pidgey") < 0.8);
        assert_eq!(multiset_similarity("", "abc"), 0.0);
    }

    #[test]
    fn permissive_accepts_windowed_typo() {
        // One substitution inside a 9-char window: similarity 8/9 > 0.7.
        assert!(permissive_match("wild pjdgeotto appeared", "pidgeotto"));
    }

    #[test]
    fn permissive_accepts_in_order_coverage() {
        // Characters present in order with one dropped.
        assert!(permissive_match("p i d g e o t t", "pidgeotto"));
    }

    #[test]
    fn permissive_rejects_unrelated_text() {
        assert!(!permissive_match("completely different words", "pidgeotto"));
    }

    #[test]
    fn fold_collapses_double_reads() {
        assert_eq!(fold_count(1), 1);
        assert_eq!(fold_count(2), 1);
        assert_eq!(fold_count(3), 3);
        assert_eq!(fold_count(5), 5);
    }
}
