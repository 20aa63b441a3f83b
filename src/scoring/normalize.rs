//! Operation string normalization and path/channel key derivation.
//!
//! An operation is a `VERB target` string where the target is a REST path
//! (`/v1/charges/{charge}`), a dotted channel
//! (`smartylighting.streetlights.1.0.event.{id}.lighting.measured`) or a bare
//! operation name (`QUERY repository`).

use std::sync::OnceLock;

use regex::Regex;

static COLON_PARAM: OnceLock<Regex> = OnceLock::new();
static ANGLE_PARAM: OnceLock<Regex> = OnceLock::new();

pub(crate) fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("hard-coded pattern compiles"))
}

/// Maps short pub/sub verbs to their long forms. Other verbs pass through.
pub fn canonical_verb(verb: &str) -> &str {
    match verb {
        "SUB" => "SUBSCRIBE",
        "PUB" => "PUBLISH",
        other => other,
    }
}

/// Whether a verb names a publish/subscribe style operation.
pub fn is_pubsub_verb(verb: &str) -> bool {
    matches!(
        verb.to_ascii_uppercase().as_str(),
        "SUBSCRIBE" | "PUBLISH" | "SUB" | "PUB"
    )
}

/// Normalizes an operation string.
///
/// Trims, collapses inner whitespace, uppercases the verb, rewrites `:id`
/// and `<id>` path parameters to `{id}` and strips trailing slashes.
/// Applying it twice gives the same result as applying it once.
pub fn normalize_operation(op: &str) -> String {
    let collapsed = op.split_whitespace().collect::<Vec<_>>().join(" ");
    let (verb, rest) = match collapsed.split_once(' ') {
        Some((verb, rest)) => (verb.to_uppercase(), Some(rest.to_string())),
        None => (collapsed.to_uppercase(), None),
    };

    let Some(rest) = rest else {
        return verb;
    };

    let rest = cached(&COLON_PARAM, r":(\w+)").replace_all(&rest, "{$1}");
    let rest = cached(&ANGLE_PARAM, r"<(\w+)>").replace_all(&rest, "{$1}");
    let rest = rest.trim_end_matches(|c: char| c == '/' || c.is_whitespace());

    if rest.is_empty() {
        verb
    } else {
        format!("{} {}", verb, rest)
    }
}

/// Splits an operation into `(verb, target)` at the first whitespace.
pub fn split_operation(op: &str) -> Option<(&str, &str)> {
    let op = op.trim();
    let idx = op.find(char::is_whitespace)?;
    let target = op[idx..].trim();
    if target.is_empty() {
        return None;
    }
    Some((&op[..idx], target))
}

fn is_path_param(segment: &str) -> bool {
    segment.starts_with('{')
}

fn strip_extension(segment: &str) -> &str {
    match segment.rfind('.') {
        Some(idx)
            if idx > 0
                && idx + 1 < segment.len()
                && segment[idx + 1..]
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_') =>
        {
            &segment[..idx]
        }
        _ => segment,
    }
}

fn is_version_marker(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

fn is_numeric(segment: &str) -> bool {
    segment.chars().any(|c| c.is_ascii_digit())
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == '.')
}

/// Meaningful lowercased segments of a path or dotted channel.
///
/// Slash-separated targets split on `/`, others on `.`. Parameters, file
/// extensions, version markers (`v1`), numeric or date-like segments and
/// segments of two characters or fewer are dropped.
pub fn path_key_segments(path: &str) -> Vec<String> {
    let separator = if path.contains('/') { '/' } else { '.' };
    path.split(separator)
        .filter(|seg| !seg.is_empty() && !is_path_param(seg))
        .map(|seg| strip_extension(seg).to_lowercase())
        .filter(|seg| seg.chars().count() > 2 && !is_version_marker(seg) && !is_numeric(seg))
        .collect()
}

/// Short search key for a pub/sub operation: the last two non-parameter
/// dotted segments, lowercased. `None` for other verbs.
pub fn channel_key(op: &str) -> Option<String> {
    let (verb, target) = split_operation(op)?;
    if !is_pubsub_verb(verb) {
        return None;
    }
    let target = target.trim().trim_matches('/').trim();
    let segments: Vec<&str> = target
        .split('.')
        .filter(|s| !s.is_empty() && !is_path_param(s))
        .collect();

    match segments.as_slice() {
        [] => None,
        [only] => Some(only.to_lowercase()),
        [.., a, b] => Some(format!("{}.{}", a, b).to_lowercase()),
    }
}

/// Primary resource of a REST path: its last non-parameter segment,
/// without extension, lowercased.
pub fn resource_name(path: &str) -> Option<String> {
    path.split('/')
        .filter(|s| !s.is_empty() && !is_path_param(s))
        .last()
        .map(|s| strip_extension(s).to_lowercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_notations_normalize_identically() {
        let expected = "GET /v1/customers/{id}";
        assert_eq!(normalize_operation("get /v1/customers/:id"), expected);
        assert_eq!(normalize_operation("GET /v1/customers/<id>"), expected);
        assert_eq!(normalize_operation("  GET   /v1/customers/{id}/ "), expected);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for op in [
            "post /v1/charges/",
            "SUB smartylighting.streetlights.1.0.event.{id}.lighting.measured",
            "query   viewer",
            "DELETE /users/:user_id/keys/<key>",
            "GET /",
        ] {
            let once = normalize_operation(op);
            assert_eq!(normalize_operation(&once), once, "not idempotent for {op}");
        }
    }

    #[test]
    fn test_normalize_is_idempotent_over_trailing_slashes_and_spaces() {
        let suffixes = ["", "/", " ", "/ /", " / ", "// ", " //", "/ / /", "\t/"];
        for base in ["GET", "GET /", "get /v1/charges", "PUB a.b.c", "DELETE /x/:id"] {
            for suffix in suffixes {
                for tail in suffixes {
                    let op = format!("{base}{suffix}{tail}");
                    let once = normalize_operation(&op);
                    assert_eq!(normalize_operation(&once), once, "not idempotent for {op:?}");
                    assert!(!once.ends_with('/'), "{op:?} -> {once:?}");
                }
            }
        }
        assert_eq!(normalize_operation("GET / /"), "GET");
        assert_eq!(normalize_operation("get /v1/charges/ / "), "GET /v1/charges");
    }

    #[test]
    fn test_split_operation() {
        assert_eq!(
            split_operation("POST /v1/charges"),
            Some(("POST", "/v1/charges"))
        );
        assert_eq!(split_operation("POST"), None);
    }

    #[test]
    fn test_path_key_segments_rest() {
        assert_eq!(
            path_key_segments("/2010-04-01/Accounts/{AccountSid}/Messages.json"),
            vec!["accounts", "messages"]
        );
        assert_eq!(
            path_key_segments("/v1/activity_logs"),
            vec!["activity_logs"]
        );
        assert!(path_key_segments("/v1/{id}").is_empty());
    }

    #[test]
    fn test_path_key_segments_dotted() {
        assert_eq!(
            path_key_segments("smartylighting.streetlights.1.0.action.{id}.turn.off"),
            vec!["smartylighting", "streetlights", "action", "turn", "off"]
        );
    }

    #[test]
    fn test_channel_key() {
        assert_eq!(
            channel_key("SUBSCRIBE smartylighting.streetlights.1.0.event.{id}.lighting.measured"),
            Some("lighting.measured".to_string())
        );
        assert_eq!(
            channel_key("PUBLISH / outgoingMessage"),
            Some("outgoingmessage".to_string())
        );
        assert_eq!(channel_key("GET /v1/charges"), None);
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("/v1/customers"), Some("customers".to_string()));
        assert_eq!(
            resource_name("/2010-04-01/Accounts/{AccountSid}/Messages.json"),
            Some("messages".to_string())
        );
        assert_eq!(resource_name("/{id}"), None);
    }

    #[test]
    fn test_canonical_verb() {
        assert_eq!(canonical_verb("SUB"), "SUBSCRIBE");
        assert_eq!(canonical_verb("PUB"), "PUBLISH");
        assert_eq!(canonical_verb("GET"), "GET");
    }
}
