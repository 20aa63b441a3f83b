//! Endpoint identification subscore.

use super::extract::{code_blocks, strip_comment_lines, structured_sections};
use super::normalize::{
    canonical_verb, channel_key, normalize_operation, path_key_segments, split_operation,
};

/// Channel key segments longer than this earn partial credit on their own.
const PARTIAL_SEGMENT_MIN_LEN: usize = 4;

/// Credit for one expected operation against the found operations and the
/// output's fenced text.
fn operation_credit(
    expected: &str,
    found: &[String],
    found_text: &str,
    structured: &str,
    code: &str,
) -> f64 {
    let exp_norm = normalize_operation(expected);
    if found.iter().any(|f| *f == exp_norm) {
        return 1.0;
    }

    let Some((exp_verb, exp_path)) = split_operation(&exp_norm) else {
        return 0.0;
    };
    let exp_verb = canonical_verb(exp_verb);

    let mut path_only = false;
    for candidate in found {
        let Some((verb, path)) = split_operation(candidate) else {
            continue;
        };
        if path == exp_path {
            if canonical_verb(verb) == exp_verb {
                return 1.0;
            }
            path_only = true;
        }
    }
    if path_only {
        return 0.5;
    }

    let segments = path_key_segments(exp_path);
    if !segments.is_empty()
        && !code.trim().is_empty()
        && segments.iter().all(|seg| code.contains(seg.as_str()))
    {
        return 1.0;
    }

    if let Some(key) = channel_key(&exp_norm) {
        let corpus = format!("{} {} {}", found_text, structured, code);
        if corpus.contains(&key) {
            return 1.0;
        }
        if key
            .split('.')
            .any(|seg| seg.len() > PARTIAL_SEGMENT_MIN_LEN && corpus.contains(seg))
        {
            return 0.5;
        }
    }

    0.0
}

/// Fraction of expected operations identified in the output, in `[0, 1]`.
/// Vacuously 1.0 when nothing is expected.
pub fn score_endpoints(found: &[String], expected: &[String], full_text: &str) -> f64 {
    if expected.is_empty() {
        return 1.0;
    }

    let found: Vec<String> = found.iter().map(|f| normalize_operation(f)).collect();
    let found_text = found.join(" ").to_lowercase();
    let structured = structured_sections(full_text).to_lowercase();
    let code = strip_comment_lines(&code_blocks(full_text).to_lowercase());

    let hits: f64 = expected
        .iter()
        .map(|exp| operation_credit(exp, &found, &found_text, &structured, &code))
        .sum();

    (hits / expected.len() as f64).min(1.0)
}
