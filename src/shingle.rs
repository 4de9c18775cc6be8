//! Tokenize markdown into word shingles for MinHash input.

use std::collections::HashSet;

/// Lowercase, keep only ASCII alphanumerics, hyphens, and whitespace, and
/// collapse whitespace runs to single spaces. Hyphens survive on purpose:
/// YAML keys and dashed slugs are the distinguishing content of many small
/// files, and stripping them collapses distinct documents onto the same
/// shingle set.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_ascii_alphanumeric() || c == '-' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        }
        // anything else is dropped without breaking the word
    }
    out
}

/// Shingle set over the normalized text. Never empty for non-empty input:
/// word shingles of `size`, then single words, then character shingles, then
/// the normalized text itself as a last resort.
pub fn shingle(text: &str, size: usize) -> HashSet<String> {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();

    if words.len() >= size {
        return words.windows(size).map(|w| w.join(" ")).collect();
    }
    if !words.is_empty() {
        return words.iter().map(|w| (*w).to_string()).collect();
    }
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() >= size {
        return chars.windows(size).map(|w| w.iter().collect()).collect();
    }
    let mut set = HashSet::new();
    set.insert(normalized);
    set
}
