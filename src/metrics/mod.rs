//! Static metrics for documentation artifacts.
//!
//! Size and token measurements are pure functions of the document text;
//! nothing here interprets the document's structure.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::warn;

use crate::registry::Tier;

/// Characters per token used when the BPE vocabulary is unavailable.
const CHARS_PER_TOKEN: usize = 4;

static CL100K: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k() -> Option<&'static CoreBPE> {
    CL100K
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!("cl100k_base unavailable, estimating tokens as chars/4: {}", e);
                None
            }
        })
        .as_ref()
}

/// Size of a single documentation artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticMetrics {
    /// Size of the document in bytes.
    pub doc_bytes: u64,
    /// `cl100k_base` token count of the document.
    pub doc_tokens: u64,
}

/// Metrics of one tier relative to the verbose original.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TierMetrics {
    pub doc_bytes: u64,
    pub doc_tokens: u64,
    /// `pretty_bytes / doc_bytes`; higher means smaller.
    pub compression_ratio: f64,
}

/// Rough token count: one token per four characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() / CHARS_PER_TOKEN) as u64
}

/// Token count under the `cl100k_base` encoding, falling back to
/// [`estimate_tokens`] if the encoding cannot be loaded.
pub fn count_tokens(text: &str) -> u64 {
    match cl100k() {
        Some(bpe) => bpe.encode_ordinary(text).len() as u64,
        None => estimate_tokens(text),
    }
}

/// Computes static metrics for a document on disk.
pub fn static_metrics(path: &Path) -> std::io::Result<StaticMetrics> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(StaticMetrics {
        doc_bytes: bytes.len() as u64,
        doc_tokens: count_tokens(&text),
    })
}

/// Ratio of original size to compressed size. Zero when the compressed
/// document is empty.
pub fn compression_ratio(original_bytes: u64, compressed_bytes: u64) -> f64 {
    if compressed_bytes == 0 {
        return 0.0;
    }
    original_bytes as f64 / compressed_bytes as f64
}

/// Compares the artifacts of one spec across tiers.
///
/// Ratios are computed against the [`Tier::Pretty`] entry when present,
/// otherwise they are reported as 1.0. Missing or unreadable artifacts are
/// reported as all-zero.
pub fn compare_tiers<P: AsRef<Path>>(tier_paths: &[(Tier, P)]) -> BTreeMap<Tier, TierMetrics> {
    let pretty_bytes = tier_paths
        .iter()
        .find(|(tier, _)| *tier == Tier::Pretty)
        .and_then(|(_, path)| fs::metadata(path.as_ref()).ok())
        .map(|m| m.len());

    tier_paths
        .iter()
        .map(|(tier, path)| {
            let metrics = match static_metrics(path.as_ref()) {
                Ok(m) => TierMetrics {
                    doc_bytes: m.doc_bytes,
                    doc_tokens: m.doc_tokens,
                    compression_ratio: pretty_bytes
                        .map(|original| compression_ratio(original, m.doc_bytes))
                        .unwrap_or(1.0),
                },
                Err(_) => TierMetrics::default(),
            };
            (*tier, metrics)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefghi"), 2);
    }

    #[test]
    fn test_count_tokens_uses_bpe() {
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("hello world"), 2);
    }

    #[test]
    fn test_bpe_and_estimate_differ_on_minified_text() {
        // Punctuation-dense JSON splits into far more tokens than chars/4.
        let minified = r#"{"a":1,"b":[2,3],"c":{"d":"e"}}"#.repeat(20);
        let bpe = count_tokens(&minified);
        let estimate = estimate_tokens(&minified);
        assert_ne!(bpe, estimate);
        assert!(bpe > estimate, "bpe={bpe} estimate={estimate}");
    }

    #[test]
    fn test_static_metrics_counts_bytes_not_chars() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("doc.yaml");
        fs::write(&path, "héllo wörld!").unwrap();

        let metrics = static_metrics(&path).unwrap();
        assert_eq!(metrics.doc_bytes, 14);
        assert_eq!(metrics.doc_tokens, count_tokens("héllo wörld!"));
    }

    #[test]
    fn test_static_metrics_missing_file() {
        assert!(static_metrics(Path::new("/definitely/not/here.yaml")).is_err());
    }

    #[test]
    fn test_compression_ratio() {
        assert_eq!(compression_ratio(1000, 250), 4.0);
        assert_eq!(compression_ratio(1000, 0), 0.0);
    }

    #[test]
    fn test_compare_tiers() {
        let temp = TempDir::new().unwrap();
        let pretty = temp.path().join("pretty.yaml");
        let lean = temp.path().join("lean.lap");
        fs::write(&pretty, "x".repeat(400)).unwrap();
        fs::write(&lean, "x".repeat(100)).unwrap();
        let missing = temp.path().join("standard.lap");

        let report = compare_tiers(&[
            (Tier::Pretty, pretty),
            (Tier::LapLean, lean),
            (Tier::LapStandard, missing),
        ]);

        assert_eq!(report[&Tier::Pretty].compression_ratio, 1.0);
        assert_eq!(report[&Tier::LapLean].doc_bytes, 100);
        assert_eq!(report[&Tier::LapLean].doc_tokens, count_tokens(&"x".repeat(100)));
        assert_eq!(report[&Tier::LapLean].compression_ratio, 4.0);
        assert_eq!(report[&Tier::LapStandard], TierMetrics::default());
    }
}
