/// Shared text helpers: normalization, tokenizing, similarity.

use rustc_hash::FxHashSet;

/// Lowercase, drop apostrophes, turn every other non-alphanumeric
/// character into a space, and collapse runs of whitespace.
///
/// "Don't  LEAVE me!" → "dont leave me"
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch == '\'' || ch == '\u{2019}' {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else {
            pending_space = true;
        }
    }
    out
}

/// Normalized word tokens.
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Word count on the raw text, used for length bonuses and style profiling.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Token-set Jaccard similarity of two texts in `0.0..=1.0`.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let left: FxHashSet<String> = tokens(a).into_iter().collect();
    let right: FxHashSet<String> = tokens(b).into_iter().collect();
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count() as f32;
    let total = left.union(&right).count() as f32;
    shared / total
}

/// Exact match after normalization, or token overlap at or above 0.8.
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize(a), normalize(b));
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    na == nb || jaccard(&na, &nb) >= 0.8
}

/// Uppercase the first character.
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split text into sentences, keeping their terminal punctuation.
pub fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        current.push(chars[i]);
        if matches!(chars[i], '.' | '!' | '?') {
            // Absorb runs like "..." or "?!"
            while i + 1 < chars.len() && matches!(chars[i + 1], '.' | '!' | '?') {
                i += 1;
                current.push(chars[i]);
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
            current.clear();
        }
        i += 1;
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    out
}

/// Collapse whitespace runs and trim.
pub fn tidy(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The first `max_words` words of `text`, lowercased, with trailing
/// punctuation dropped. Used when the narrator quotes the user.
pub fn snippet(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().take(max_words).collect();
    words
        .join(" ")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}
