//! Run results as persisted in a batch directory.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::StaticMetrics;
use crate::registry::{SpecFormat, Tier};
use crate::scoring::ScoreRecord;

/// Maximum persisted length of captured stdout/stderr, in bytes.
pub const MAX_CAPTURE_BYTES: usize = 10_000;

/// Status of a run's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Not executed yet.
    #[default]
    Pending,
    /// Agent exited with status 0.
    Completed,
    /// Agent exited non-zero, or the run failed around the agent call.
    Error,
    /// Agent exceeded its wall-clock budget.
    Timeout,
}

impl RunStatus {
    /// Terminal runs are never dispatched again within a batch.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Pending)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "completed" => Some(RunStatus::Completed),
            "error" => Some(RunStatus::Error),
            "timeout" => Some(RunStatus::Timeout),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
            RunStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Token usage reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
}

impl TokenUsage {
    /// Returns total tokens used, cache traffic included.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

/// Raw outcome of invoking the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: RunStatus,
    /// Wall time in seconds, rounded to hundredths.
    pub wall_time_secs: f64,
    /// Captured stdout (truncated if too long).
    #[serde(default)]
    pub stdout: String,
    /// Captured stderr (truncated if too long).
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub return_code: Option<i32>,
    /// Free-text answer: the structured `result` field, or raw stdout.
    #[serde(default)]
    pub output_text: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub num_turns: u64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub cli_duration_ms: u64,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Failure description for runs that broke around the agent call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// A record for a run that failed before or after the agent call.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// A record for a run that hit its wall-clock budget.
    pub fn timeout(budget_secs: f64) -> Self {
        Self {
            status: RunStatus::Timeout,
            wall_time_secs: budget_secs,
            ..Default::default()
        }
    }

    /// Sets stdout, truncated for persistence.
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = truncate_string(stdout.into(), MAX_CAPTURE_BYTES);
        self
    }

    /// Sets stderr, truncated for persistence.
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = truncate_string(stderr.into(), MAX_CAPTURE_BYTES);
        self
    }

    /// Whether the run produced text worth scoring.
    pub fn is_scorable(&self) -> bool {
        self.status == RunStatus::Completed && !self.output_text.trim().is_empty()
    }
}

/// Reference to an exported session transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRef {
    /// Where the transcript was found.
    pub source: PathBuf,
    /// Copy inside the batch's recordings directory, once exported.
    #[serde(default)]
    pub exported: Option<PathBuf>,
    pub size_bytes: u64,
}

/// Complete result of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub spec_id: String,
    pub format: SpecFormat,
    pub tier: Tier,
    pub task_id: String,
    pub model: String,
    #[serde(default)]
    pub doc_path: Option<PathBuf>,
    #[serde(default)]
    pub doc_url: Option<String>,
    pub execution: ExecutionRecord,
    /// Absent for the no-documentation tier.
    #[serde(default)]
    pub static_metrics: Option<StaticMetrics>,
    #[serde(default)]
    pub score: ScoreRecord,
    #[serde(default)]
    pub recording: Option<RecordingRef>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Returns true if the agent exited cleanly.
    pub fn is_success(&self) -> bool {
        self.execution.status == RunStatus::Completed
    }

    /// `spec:tier:task` label used in progress output.
    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.spec_id, self.tier, self.task_id)
    }
}

/// Truncates a string to at most `max_len` bytes on a char boundary.
pub(crate) fn truncate_string(s: String, max_len: usize) -> String {
    if s.len() <= max_len {
        return s;
    }
    let mut cut = max_len;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &s[..cut])
}
