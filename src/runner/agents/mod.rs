//! Agent adapters.
//!
//! An adapter launches the external agent for one run and returns whatever
//! it printed. Interpreting that output is done by [`parse_agent_output`],
//! which never fails: anything that is not the expected JSON envelope is
//! kept as raw text.

pub mod claude;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::result::{ExecutionRecord, TokenUsage};
use crate::error::ExecutorError;

pub use claude::ClaudeCliAdapter;

/// Everything an adapter needs to run the agent once.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    /// Rendered prompt, already written into the workspace.
    pub prompt_file: PathBuf,
    /// Working directory for the agent.
    pub working_dir: PathBuf,
    pub model: String,
    pub allowed_tools: Vec<String>,
    pub timeout: Duration,
}

/// Raw result of running an agent process.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Exit code, -1 when killed by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl AgentOutput {
    pub fn new(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    /// Checks if the agent completed successfully (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for agent adapters.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Runs the agent. Exceeding `invocation.timeout` must kill the process
    /// and return [`ExecutorError::Timeout`].
    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutput, ExecutorError>;
}

/// Fields of the agent's JSON output envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredOutput {
    pub result: String,
    pub session_id: Option<String>,
    pub num_turns: u64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
    pub usage: TokenUsage,
}

/// Agent stdout after interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    Structured(StructuredOutput),
    RawText(String),
}

impl ParsedOutput {
    /// The free-text answer to score.
    pub fn text(&self) -> &str {
        match self {
            ParsedOutput::Structured(s) => &s.result,
            ParsedOutput::RawText(text) => text,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            ParsedOutput::Structured(s) => s.session_id.as_deref(),
            ParsedOutput::RawText(_) => None,
        }
    }

    /// Copies the parsed fields onto an execution record.
    pub fn apply_to(self, record: &mut ExecutionRecord) {
        match self {
            ParsedOutput::Structured(s) => {
                record.output_text = s.result;
                record.session_id = s.session_id;
                record.num_turns = s.num_turns;
                record.cost_usd = s.total_cost_usd;
                record.cli_duration_ms = s.duration_ms;
                record.usage = s.usage;
            }
            ParsedOutput::RawText(text) => {
                record.output_text = text;
            }
        }
    }
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}

/// Interprets agent stdout. A JSON object yields [`ParsedOutput::Structured`]
/// (with stdout as the text when it has no string `result`); anything else
/// is [`ParsedOutput::RawText`].
pub fn parse_agent_output(stdout: &str) -> ParsedOutput {
    let value: Value = match serde_json::from_str(stdout.trim()) {
        Ok(value @ Value::Object(_)) => value,
        _ => return ParsedOutput::RawText(stdout.to_string()),
    };

    let usage = value.get("usage").cloned().unwrap_or(Value::Null);
    ParsedOutput::Structured(StructuredOutput {
        result: value
            .get("result")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| stdout.to_string()),
        session_id: value
            .get("session_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        num_turns: u64_field(&value, "num_turns"),
        total_cost_usd: value
            .get("total_cost_usd")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        duration_ms: u64_field(&value, "duration_ms"),
        usage: TokenUsage {
            input_tokens: u64_field(&usage, "input_tokens"),
            output_tokens: u64_field(&usage, "output_tokens"),
            cache_creation_tokens: u64_field(&usage, "cache_creation_input_tokens"),
            cache_read_tokens: u64_field(&usage, "cache_read_input_tokens"),
        },
    })
}
