//! Agent session transcripts.
//!
//! The agent writes one JSONL file per session under
//! `<store>/<project>/<session_id>.jsonl`. Lookups are best-effort: every
//! failure reads as "no transcript".

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Default transcript store: `$HOME/.claude/projects`.
pub fn default_store() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".claude").join("projects"))
}

fn is_jsonl(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Finds the transcript of a session.
///
/// With a session id, an exact `<session_id>.jsonl` in any project directory
/// wins. Otherwise (or when there is no exact match) the most recently
/// modified transcript in the store is returned.
pub fn find_session_transcript(store: &Path, session_id: Option<&str>) -> Option<PathBuf> {
    if !store.is_dir() {
        return None;
    }

    if let Some(session_id) = session_id {
        let file_name = format!("{}.jsonl", session_id);
        let exact = fs::read_dir(store)
            .ok()?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|dir| dir.is_dir())
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file());
        if exact.is_some() {
            return exact;
        }
        debug!("No transcript named {} in {}", file_name, store.display());
    }

    WalkDir::new(store)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_jsonl(entry.path()))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.into_path()))
        })
        .max_by_key(|(modified, _): &(SystemTime, PathBuf)| *modified)
        .map(|(_, path)| path)
}

/// Copies a transcript to `<recordings_dir>/<run_id>.jsonl`. Failures are
/// logged and yield `None`.
pub fn export_recording(source: &Path, recordings_dir: &Path, run_id: &str) -> Option<PathBuf> {
    if let Err(e) = fs::create_dir_all(recordings_dir) {
        warn!("Failed to create {}: {}", recordings_dir.display(), e);
        return None;
    }
    let dest = recordings_dir.join(format!("{}.jsonl", run_id));
    match fs::copy(source, &dest) {
        Ok(_) => Some(dest),
        Err(e) => {
            warn!("Failed to export transcript {}: {}", source.display(), e);
            None
        }
    }
}

/// What a session transcript says about a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub message_count: usize,
    /// Assistant messages.
    pub turn_count: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub tool_calls: usize,
    pub tool_names: Vec<String>,
    /// A tool reported an error during the session.
    pub has_error: bool,
    /// Text of the last assistant message that had any.
    pub final_text: String,
}

impl TranscriptSummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Messages may be stored bare or wrapped in a `message` envelope.
fn message_body(entry: &Value) -> &Value {
    match entry.get("message") {
        Some(inner) if inner.is_object() => inner,
        _ => entry,
    }
}

fn assistant_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let parts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(_) if block.get("type").and_then(Value::as_str) == Some("text") => {
                        Some(block.get("text").and_then(Value::as_str).unwrap_or(""))
                    }
                    _ => None,
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        _ => None,
    }
}

/// Parses JSONL transcript text. Malformed lines are skipped.
pub fn parse_transcript_str(text: &str) -> TranscriptSummary {
    let mut summary = TranscriptSummary::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        summary.message_count += 1;

        let body = message_body(&entry);
        let is_assistant = body.get("role").and_then(Value::as_str) == Some("assistant");
        if is_assistant {
            summary.turn_count += 1;
        }

        if let Some(usage) = body.get("usage") {
            summary.input_tokens += usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
            summary.output_tokens += usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0);
        }

        let content = body.get("content").unwrap_or(&Value::Null);
        if let Value::Array(blocks) = content {
            for block in blocks {
                match block.get("type").and_then(Value::as_str) {
                    Some("tool_use") => {
                        summary.tool_calls += 1;
                        summary.tool_names.push(
                            block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string(),
                        );
                    }
                    Some("tool_result")
                        if block.get("is_error").and_then(Value::as_bool) == Some(true) =>
                    {
                        summary.has_error = true;
                    }
                    _ => {}
                }
            }
        }

        if is_assistant {
            if let Some(text) = assistant_text(content) {
                summary.final_text = text;
            }
        }
    }

    summary
}

/// Parses a transcript file.
pub fn parse_transcript(path: &Path) -> std::io::Result<TranscriptSummary> {
    let bytes = fs::read(path)?;
    Ok(parse_transcript_str(&String::from_utf8_lossy(&bytes)))
}
