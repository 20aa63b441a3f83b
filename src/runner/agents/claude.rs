//! Adapter for the `claude` command-line agent (or anything that speaks the
//! same flags).

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{AgentAdapter, AgentInvocation, AgentOutput};
use crate::error::ExecutorError;
use crate::runner::config::AgentSettings;

/// Environment always set for the agent process.
const BASE_ENV: [(&str, &str); 1] = [("CLAUDE_CODE_DISABLE_NONESSENTIAL", "1")];

/// Runs the agent CLI in print mode with JSON output.
pub struct ClaudeCliAdapter {
    /// Base command to run.
    command: String,
    /// Arguments placed before the generated ones.
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl ClaudeCliAdapter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            command: settings.command.clone(),
            args: settings.args.clone(),
            env: settings.env.clone(),
        }
    }

    /// Creates with leading arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Full argument list for one invocation.
    pub fn command_args(&self, invocation: &AgentInvocation) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend([
            "-p".to_string(),
            format!("@{}", invocation.prompt_file.display()),
            "--model".to_string(),
            invocation.model.clone(),
            "--allowedTools".to_string(),
            invocation.allowed_tools.join(","),
            "--output-format".to_string(),
            "json".to_string(),
        ]);
        args
    }
}

#[async_trait]
impl AgentAdapter for ClaudeCliAdapter {
    fn name(&self) -> &str {
        &self.command
    }

    async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutput, ExecutorError> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.command);
        cmd.args(self.command_args(invocation))
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in BASE_ENV {
            cmd.env(key, value);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        info!(
            "Starting agent: {} in {}",
            self.command,
            invocation.working_dir.display()
        );

        let child = cmd.spawn().map_err(|source| ExecutorError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = tokio::time::timeout(invocation.timeout, child.wait_with_output()).await;
        let duration = start.elapsed();

        match waited {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                debug!("Agent exited with code {} after {:?}", exit_code, duration);
                Ok(AgentOutput::new(
                    exit_code,
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration,
                ))
            }
            Ok(Err(e)) => Err(ExecutorError::Io(e)),
            Err(_) => Err(ExecutorError::Timeout(invocation.timeout)),
        }
    }
}
