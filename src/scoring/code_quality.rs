//! Code quality subscore: evidence of the target operations and parameters
//! inside language-tagged code blocks, plus a hallucination check.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::extract::{code_blocks, strip_comment_lines};
use super::normalize::{cached, normalize_operation, path_key_segments, resource_name, split_operation};

const ENDPOINT_WEIGHT: f64 = 0.4;
const PARAM_WEIGHT: f64 = 0.4;
const HONESTY_WEIGHT: f64 = 0.2;

/// Credit when only one kind of evidence is present.
const PARTIAL_EVIDENCE: f64 = 0.75;

const SDK_ACTIONS: [&str; 8] = [
    ".create(",
    ".list(",
    ".retrieve(",
    ".fetch(",
    ".get(",
    ".update(",
    ".delete(",
    ".send(",
];

static HALLUCINATION: OnceLock<Regex> = OnceLock::new();

const HALLUCINATION_PATTERN: &str = concat!(
    r"(?i)I don['’]?t have (access|information)",
    r"|this endpoint (doesn['’]?t|does not) exist",
    r"|I['’]?m (not sure|unable)",
    r"|hallucinated",
);

/// Breakdown of the code quality subscore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeQuality {
    pub total: f64,
    pub endpoints_in_code: f64,
    pub params_in_code: f64,
    pub has_code: bool,
    pub no_hallucination: bool,
}

/// Whether the full output admits to not knowing the API.
pub fn admits_hallucination(text: &str) -> bool {
    cached(&HALLUCINATION, HALLUCINATION_PATTERN).is_match(text)
}

fn verb_in_code(verb: &str, code: &str) -> bool {
    let verb = verb.to_lowercase();
    if code.contains(&format!("requests.{}(", verb))
        || code.contains(&format!("httpx.{}(", verb))
        || code.contains(&format!(".{}(", verb))
    {
        return true;
    }
    match verb.as_str() {
        "subscribe" | "sub" => code.contains("consumer") || code.contains("subscribe"),
        "publish" | "pub" => {
            code.contains("producer") || code.contains("publish") || code.contains(".send(")
        }
        "query" | "mutation" => code.contains(verb.as_str()),
        "rpc" => code.contains("grpc"),
        _ => false,
    }
}

fn sdk_call_in_code(path: &str, code: &str) -> bool {
    let Some(resource) = resource_name(path) else {
        return false;
    };
    let singular = resource.strip_suffix('s').filter(|s| !s.is_empty());

    SDK_ACTIONS.iter().any(|action| {
        code.contains(&format!(".{}{}", resource, action))
            || singular.is_some_and(|s| code.contains(&format!(".{}{}", s, action)))
    })
}

fn endpoint_evidence(op: &str, code: &str) -> f64 {
    let normalized = normalize_operation(op);
    let Some((verb, path)) = split_operation(&normalized) else {
        return 0.0;
    };

    let segments = path_key_segments(path);
    let path_in_code = segments.iter().all(|seg| code.contains(seg.as_str()));
    let verb_found = verb_in_code(verb, code);
    let sdk_found = sdk_call_in_code(path, code);

    if path_in_code && (verb_found || sdk_found) {
        1.0
    } else if path_in_code || sdk_found {
        PARTIAL_EVIDENCE
    } else {
        0.0
    }
}

/// Scores the code blocks of an agent output.
pub fn score_code_quality(
    text: &str,
    target_operations: &[String],
    expected_params: &BTreeMap<String, Vec<String>>,
) -> CodeQuality {
    let code = code_blocks(text).to_lowercase();
    let has_code = !code.trim().is_empty();
    let code_no_comments = strip_comment_lines(&code);

    let endpoints_in_code = if target_operations.is_empty() {
        1.0
    } else if has_code {
        let hits: f64 = target_operations
            .iter()
            .map(|op| endpoint_evidence(op, &code_no_comments))
            .sum();
        hits / target_operations.len() as f64
    } else {
        0.0
    };

    let params: Vec<String> = expected_params
        .values()
        .flatten()
        .map(|p| p.to_lowercase())
        .collect();
    let params_in_code = if params.is_empty() {
        1.0
    } else if has_code {
        let hits = params
            .iter()
            .filter(|p| code.contains(p.as_str()) || code.contains(&p.replace('_', "-")))
            .count();
        hits as f64 / params.len() as f64
    } else {
        0.0
    };

    let no_hallucination = !admits_hallucination(text);

    let mut total = 0.0;
    if has_code {
        total += ENDPOINT_WEIGHT * endpoints_in_code + PARAM_WEIGHT * params_in_code;
    }
    if no_hallucination {
        total += HONESTY_WEIGHT;
    }

    CodeQuality {
        total: total.clamp(0.0, 1.0),
        endpoints_in_code,
        params_in_code,
        has_code,
        no_hallucination,
    }
}
