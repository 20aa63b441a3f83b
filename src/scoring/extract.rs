//! Candidate operation and fenced-block extraction from agent output.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::normalize::{cached, canonical_verb, normalize_operation};

static METHOD_LABEL: OnceLock<Regex> = OnceLock::new();
static ENDPOINT_LABEL: OnceLock<Regex> = OnceLock::new();
static HTTP_INLINE: OnceLock<Regex> = OnceLock::new();
static NAMED_OPERATION: OnceLock<Regex> = OnceLock::new();
static PUBSUB_INLINE: OnceLock<Regex> = OnceLock::new();
static CHANNEL_LABEL: OnceLock<Regex> = OnceLock::new();
static OPERATION_LABEL: OnceLock<Regex> = OnceLock::new();

/// Maximum line distance between a `Method:` label and its `Endpoint:`.
const LABEL_PAIR_WINDOW: usize = 3;

/// Channel/topic labels shorter than this are ignored.
const MIN_CHANNEL_LEN: usize = 6;

/// A fenced block from markdown-ish text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock {
    /// First word of the info string, if any.
    pub language: Option<String>,
    pub body: String,
}

impl FencedBlock {
    pub fn is_tagged(&self) -> bool {
        self.language.is_some()
    }
}

/// Scans closed ``` fenced blocks. An unterminated trailing block is
/// dropped.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(Option<String>, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match open.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    let language = info.split_whitespace().next().map(str::to_string);
                    open = Some((language, Vec::new()));
                }
            }
            Some((language, mut body)) => {
                if trimmed.starts_with("```") {
                    blocks.push(FencedBlock {
                        language,
                        body: body.join("\n"),
                    });
                } else {
                    body.push(line);
                    open = Some((language, body));
                }
            }
        }
    }

    blocks
}

/// Text of every fenced block, tagged or not.
pub fn structured_sections(text: &str) -> String {
    fenced_blocks(text)
        .into_iter()
        .map(|b| b.body)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of language-tagged fenced blocks only.
pub fn code_blocks(text: &str) -> String {
    fenced_blocks(text)
        .into_iter()
        .filter(FencedBlock::is_tagged)
        .map(|b| b.body)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drops whole-line `#` and `//` comments.
pub fn strip_comment_lines(code: &str) -> String {
    code.lines()
        .filter(|line| {
            let line = line.trim_start();
            !line.starts_with('#') && !line.starts_with("//")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_target(raw: &str) -> &str {
    raw.trim_matches(|c: char| matches!(c, '`' | '"' | '\''))
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | ')' | '.' | ':' | '`' | '"' | '\''))
}

fn line_of(newlines: &[usize], pos: usize) -> usize {
    newlines.partition_point(|&nl| nl < pos)
}

/// `Method: X` followed within a few lines by `Endpoint: Y`.
fn labeled_pairs(text: &str) -> Vec<String> {
    let newlines: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| *c == '\n')
        .map(|(i, _)| i)
        .collect();

    let methods: Vec<(usize, &str)> = cached(&METHOD_LABEL, r"(?i)\bMethod:\s*(\S+)")
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();
    let endpoints: Vec<(usize, &str)> = cached(&ENDPOINT_LABEL, r"(?i)\bEndpoint:\s*(\S+)")
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| (m.start(), m.as_str()))
        .collect();

    let mut pairs = Vec::new();
    for (i, (method_pos, method)) in methods.iter().enumerate() {
        let next_method = methods.get(i + 1).map(|(p, _)| *p).unwrap_or(usize::MAX);
        let method_line = line_of(&newlines, *method_pos);

        let endpoint = endpoints.iter().find(|(pos, _)| {
            *pos > *method_pos
                && *pos < next_method
                && line_of(&newlines, *pos) - method_line <= LABEL_PAIR_WINDOW
        });

        if let Some((_, path)) = endpoint {
            let verb: String = method
                .to_uppercase()
                .chars()
                .filter(|c| c.is_ascii_uppercase())
                .collect();
            if verb.is_empty() {
                continue;
            }
            pairs.push(normalize_operation(&format!(
                "{} {}",
                canonical_verb(&verb),
                clean_target(path)
            )));
        }
    }
    pairs
}

/// Extracts candidate operations from free text, deduplicated in first-seen
/// order.
pub fn extract_operations(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |op: String| {
        if seen.insert(op.clone()) {
            found.push(op);
        }
    };

    for op in labeled_pairs(text) {
        push(op);
    }

    let http = cached(
        &HTTP_INLINE,
        r"(?i)\b(GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS)\s+(/\S+)",
    );
    for caps in http.captures_iter(text) {
        let target = clean_target(&caps[2]);
        if !target.is_empty() {
            push(normalize_operation(&format!("{} {}", &caps[1], target)));
        }
    }

    let named = cached(&NAMED_OPERATION, r"(?i)\b(RPC|QUERY|MUTATION)\s+(\w+)");
    for caps in named.captures_iter(text) {
        push(format!("{} {}", caps[1].to_uppercase(), &caps[2]));
    }

    let pubsub = cached(
        &PUBSUB_INLINE,
        r"(?i)\b(SUBSCRIBE|PUBLISH|SUB|PUB)\s+/?\s*([\w./{}\-]+)",
    );
    for caps in pubsub.captures_iter(text) {
        let verb = caps[1].to_uppercase();
        push(normalize_operation(&format!(
            "{} {}",
            canonical_verb(&verb),
            &caps[2]
        )));
    }

    let channel = cached(&CHANNEL_LABEL, r"(?i)(?:Channel|Topic):\s*([\w./{}\-:]+)");
    for caps in channel.captures_iter(text) {
        let name = &caps[1];
        if name.chars().count() >= MIN_CHANNEL_LEN {
            push(format!("CHANNEL {}", name));
        }
    }

    let operation = cached(&OPERATION_LABEL, r"(?i)\bOperation:\s*(\w+)");
    for caps in operation.captures_iter(text) {
        push(format!("OPERATION {}", &caps[1]));
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_endpoint_labels() {
        let text = "CALL 1:\n  Method: POST\n  Endpoint: /v1/charges\n\nCALL 2:\n  Method: GET\n  Endpoint: `/v1/charges/:id`\n";
        let ops = extract_operations(text);
        assert!(ops.contains(&"POST /v1/charges".to_string()));
        assert!(ops.contains(&"GET /v1/charges/{id}".to_string()));
    }

    #[test]
    fn test_method_label_without_endpoint_is_not_paired_with_later_one() {
        let text = "Method: POST\nsome\nprose\nhere\nand\nmore\nEndpoint: /v1/late";
        let ops = extract_operations(text);
        assert!(!ops.iter().any(|op| op.starts_with("POST")));
    }

    #[test]
    fn test_pubsub_method_alias_in_labels() {
        let text = "Method: SUB)\nEndpoint: smartylighting.streetlights.1.0.event.{id}.lighting.measured";
        let ops = extract_operations(text);
        assert_eq!(
            ops[0],
            "SUBSCRIBE smartylighting.streetlights.1.0.event.{id}.lighting.measured"
        );
    }

    #[test]
    fn test_inline_http_and_dedup() {
        let text = "First call POST /v1/customers, then post /v1/customers again.";
        let ops = extract_operations(text);
        assert_eq!(
            ops.iter().filter(|op| *op == "POST /v1/customers").count(),
            1
        );
    }

    #[test]
    fn test_named_operations_and_labels() {
        let text = "Use mutation createIssue then RPC GetFeature.\nChannel: user/signedup\nTopic: abc\nOperation: receiveLightMeasurement";
        let ops = extract_operations(text);
        assert!(ops.contains(&"MUTATION createIssue".to_string()));
        assert!(ops.contains(&"RPC GetFeature".to_string()));
        assert!(ops.contains(&"CHANNEL user/signedup".to_string()));
        assert!(!ops.iter().any(|op| op == "CHANNEL abc"));
        assert!(ops.contains(&"OPERATION receiveLightMeasurement".to_string()));
    }

    #[test]
    fn test_fenced_blocks_tagged_and_untagged() {
        let text = "intro\n```\nCALL 1\n```\nprose\n```python\nimport requests\n```\n```json\n{\"a\": 1}\n";
        let blocks = fenced_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert!(!blocks[0].is_tagged());
        assert_eq!(blocks[1].language.as_deref(), Some("python"));

        assert_eq!(structured_sections(text), "CALL 1\nimport requests");
        assert_eq!(code_blocks(text), "import requests");
    }

    #[test]
    fn test_strip_comment_lines() {
        let code = "# comment\nx = 1\n    // other\ny = 2";
        assert_eq!(strip_comment_lines(code), "x = 1\ny = 2");
    }
}
