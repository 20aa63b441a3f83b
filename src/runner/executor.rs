//! Agent executor: runs one descriptor in a fresh sandbox.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::agents::{parse_agent_output, AgentAdapter, AgentInvocation, ClaudeCliAdapter};
use super::config::{BenchConfig, ResolvedPaths};
use super::manifest::RunDescriptor;
use super::result::{ExecutionRecord, RecordingRef, RunStatus};
use super::sandbox::{Sandbox, DOC_FILE_NAME};
use super::transcript::find_session_transcript;
use crate::error::ExecutorError;
use crate::prompts::{DocDelivery, PromptTemplate};
use crate::registry::Tier;

/// What executing a descriptor produced.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub record: ExecutionRecord,
    /// Session transcript located after the run, not yet exported.
    pub transcript: Option<RecordingRef>,
}

/// Runs descriptors against the agent, one sandbox per run.
pub struct AgentRunner {
    adapter: Arc<dyn AgentAdapter>,
    template: PromptTemplate,
    model: String,
    allowed_tools: Vec<String>,
    timeout: Duration,
    sandbox_root: PathBuf,
    transcript_store: Option<PathBuf>,
}

impl AgentRunner {
    pub fn new(
        adapter: Arc<dyn AgentAdapter>,
        template: PromptTemplate,
        model: impl Into<String>,
        sandbox_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            adapter,
            template,
            model: model.into(),
            allowed_tools: Vec::new(),
            timeout: Duration::from_secs(180),
            sandbox_root: sandbox_root.into(),
            transcript_store: None,
        }
    }

    /// Builds a runner for the configured agent command.
    pub fn from_config(config: &BenchConfig, paths: &ResolvedPaths, template: PromptTemplate) -> Self {
        let adapter = Arc::new(ClaudeCliAdapter::from_settings(&config.agent));
        let runner = Self::new(adapter, template, config.model.clone(), paths.sandbox_root.clone())
            .with_timeout(config.timeout())
            .with_allowed_tools(config.agent.allowed_tools.clone());
        match &paths.transcript_dir {
            Some(store) => runner.with_transcript_store(store.clone()),
            None => runner,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = tools;
        self
    }

    /// Sets the directory searched for session transcripts.
    pub fn with_transcript_store(mut self, store: impl Into<PathBuf>) -> Self {
        self.transcript_store = Some(store.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Executes one run. Never fails: every problem ends up in the record's
    /// status, and the sandbox is removed on every path.
    pub async fn execute(&self, desc: &RunDescriptor, local: bool) -> ExecutionOutcome {
        info!(run_id = %desc.run_id, "Executing {}", desc.label());

        let record = match Sandbox::create(&self.sandbox_root) {
            Ok(mut sandbox) => {
                let record = self.execute_in(&sandbox, desc, local).await;
                sandbox.cleanup();
                record
            }
            Err(e) => ExecutionRecord::error(e.to_string()),
        };

        if let Some(error) = &record.error {
            warn!(run_id = %desc.run_id, status = %record.status, "{}", error);
        }

        let transcript = self.locate_transcript(record.session_id.as_deref());
        ExecutionOutcome { record, transcript }
    }

    async fn execute_in(&self, sandbox: &Sandbox, desc: &RunDescriptor, local: bool) -> ExecutionRecord {
        let delivery = match self.prepare_delivery(sandbox, desc, local) {
            Ok(delivery) => delivery,
            Err(e) => return ExecutionRecord::error(e.to_string()),
        };
        debug!(run_id = %desc.run_id, "Documentation delivery: {}", delivery.mode());

        let prompt = self.template.render(&delivery, &desc.task_description);
        let prompt_file = match sandbox.write_prompt(&prompt) {
            Ok(path) => path,
            Err(e) => return ExecutionRecord::error(e.to_string()),
        };

        let invocation = AgentInvocation {
            prompt_file,
            working_dir: sandbox.workspace().to_path_buf(),
            model: self.model.clone(),
            allowed_tools: self.allowed_tools.clone(),
            timeout: self.timeout,
        };

        let start = Instant::now();
        let output = self.adapter.run(&invocation).await;
        let wall_time = start.elapsed().as_secs_f64();

        match output {
            Ok(output) => {
                let status = if output.is_success() {
                    RunStatus::Completed
                } else {
                    RunStatus::Error
                };
                let mut record = ExecutionRecord {
                    status,
                    wall_time_secs: wall_time,
                    return_code: Some(output.exit_code),
                    ..Default::default()
                }
                .with_stdout(output.stdout.clone())
                .with_stderr(output.stderr);
                parse_agent_output(&output.stdout).apply_to(&mut record);
                record
            }
            Err(ExecutorError::Timeout(budget)) => {
                warn!(run_id = %desc.run_id, "Agent timed out after {:?}", budget);
                ExecutionRecord::timeout(budget.as_secs_f64())
            }
            Err(e) => ExecutionRecord {
                wall_time_secs: wall_time,
                ..ExecutionRecord::error(e.to_string())
            },
        }
    }

    /// Chooses how the documentation reaches the agent, staging it into the
    /// workspace for local delivery.
    fn prepare_delivery(
        &self,
        sandbox: &Sandbox,
        desc: &RunDescriptor,
        local: bool,
    ) -> Result<DocDelivery, ExecutorError> {
        if desc.tier == Tier::None {
            return Ok(DocDelivery::None);
        }
        match (&desc.doc.url, local) {
            (Some(url), false) => Ok(DocDelivery::Remote { url: url.clone() }),
            _ => {
                let path = desc.doc.path.as_deref().ok_or_else(|| {
                    ExecutorError::MissingArtifact(format!("no document for {}", desc.label()))
                })?;
                sandbox.stage_document(path)?;
                Ok(DocDelivery::Local {
                    file_name: DOC_FILE_NAME.to_string(),
                })
            }
        }
    }

    fn locate_transcript(&self, session_id: Option<&str>) -> Option<RecordingRef> {
        let store = self.transcript_store.as_deref()?;
        let source = find_session_transcript(store, session_id)?;
        let size_bytes = fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
        Some(RecordingRef {
            source,
            exported: None,
            size_bytes,
        })
    }
}
