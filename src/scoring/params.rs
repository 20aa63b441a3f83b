//! Parameter accuracy subscore.

use std::collections::BTreeMap;

use super::extract::structured_sections;

fn is_word_char(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

/// Whether `needle` occurs in `haystack` without a lowercase letter or
/// underscore directly before or after it. Both sides must already be
/// lowercased.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        if !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char) {
            return true;
        }
        // Occurrences may overlap, so resume one character in.
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Fraction of expected parameters named inside fenced blocks, in `[0, 1]`.
/// Vacuously 1.0 when no parameters are expected.
pub fn score_params(text: &str, expected_params: &BTreeMap<String, Vec<String>>) -> f64 {
    let structured = structured_sections(text).to_lowercase();

    let mut total = 0usize;
    let mut found = 0usize;
    for param in expected_params.values().flatten() {
        total += 1;
        if contains_word(&structured, &param.to_lowercase()) {
            found += 1;
        }
    }

    if total == 0 {
        1.0
    } else {
        found as f64 / total as f64
    }
}
