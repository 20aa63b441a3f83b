//! Batch orchestrator.
//!
//! Dispatches pending runs over a bounded pool, scores and persists each one
//! as soon as it finishes, and reports completions in the order they happen.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::checkpoint::CheckpointStore;
use super::executor::AgentRunner;
use super::manifest::RunDescriptor;
use super::progress::{InFlightGuard, ProgressCounters, ProgressMonitor};
use super::result::{ExecutionRecord, RunResult};
use super::transcript::export_recording;
use crate::metrics::static_metrics;
use crate::scoring::{score_run, ScoreRecord, ScoreWeights};

/// Counts reported after a batch invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub attempted: usize,
    /// Runs with status `completed`.
    pub completed: usize,
    /// Runs that errored, timed out or whose task panicked.
    pub failed: usize,
    pub elapsed: Duration,
}

/// Descriptors of `manifest` with no terminal result in `store`, in
/// manifest order.
pub fn pending_runs(store: &CheckpointStore, manifest: &[RunDescriptor]) -> Vec<RunDescriptor> {
    let done: HashSet<String> = store.completed_ids();
    manifest
        .iter()
        .filter(|desc| !done.contains(&desc.run_id))
        .cloned()
        .collect()
}

/// State shared by every run task.
struct RunContext {
    runner: AgentRunner,
    weights: ScoreWeights,
    store: CheckpointStore,
}

/// Runs a batch of descriptors against the agent.
pub struct BatchOrchestrator {
    ctx: Arc<RunContext>,
    concurrency: usize,
    local: bool,
    progress_interval: Duration,
}

impl BatchOrchestrator {
    pub fn new(runner: AgentRunner, weights: ScoreWeights, store: CheckpointStore) -> Self {
        Self {
            ctx: Arc::new(RunContext {
                runner,
                weights,
                store,
            }),
            concurrency: 1,
            local: false,
            progress_interval: Duration::from_secs(60),
        }
    }

    /// Sets the worker pool size. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Forces local document delivery for every run.
    pub fn with_local_delivery(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.ctx.store
    }

    /// Drops every descriptor whose run is already terminal in the batch
    /// directory, keeping manifest order.
    pub fn pending(&self, manifest: &[RunDescriptor]) -> Vec<RunDescriptor> {
        pending_runs(&self.ctx.store, manifest)
    }

    /// Executes `pending`. `on_complete(done, total, result)` is called once
    /// per finished run, in completion order. With a pool of one, runs go
    /// strictly in the given order.
    pub async fn run<F>(&self, pending: Vec<RunDescriptor>, mut on_complete: F) -> BatchSummary
    where
        F: FnMut(usize, usize, &RunResult),
    {
        let total = pending.len();
        let counters = ProgressCounters::new();
        let monitor = ProgressMonitor::start(counters.clone(), total, self.progress_interval);
        let start = Instant::now();

        info!(
            total = total,
            concurrency = self.concurrency,
            "Dispatching batch in {}",
            self.ctx.store.batch_dir().display()
        );

        if self.concurrency == 1 {
            for (index, desc) in pending.iter().enumerate() {
                let result = {
                    let _in_flight = InFlightGuard::new(&counters);
                    run_isolated(self.ctx.clone(), desc.clone(), self.local).await
                };
                counters.record(result.is_success());
                on_complete(index + 1, total, &result);
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut tasks = JoinSet::new();

            for desc in pending {
                let ctx = self.ctx.clone();
                let semaphore = semaphore.clone();
                let counters = counters.clone();
                let local = self.local;
                tasks.spawn(async move {
                    // The semaphore is never closed, so acquiring cannot fail.
                    let _permit = semaphore.acquire_owned().await;
                    let _in_flight = InFlightGuard::new(&counters);
                    run_isolated(ctx, desc, local).await
                });
            }

            let mut done = 0;
            while let Some(joined) = tasks.join_next().await {
                done += 1;
                match joined {
                    Ok(result) => {
                        counters.record(result.is_success());
                        on_complete(done, total, &result);
                    }
                    Err(e) => {
                        error!("Run task failed to complete: {}", e);
                        counters.record(false);
                    }
                }
            }
        }

        monitor.stop().await;
        let snap = counters.snapshot(start);
        let summary = BatchSummary {
            attempted: snap.attempted,
            completed: snap.completed,
            failed: snap.failed,
            elapsed: snap.elapsed,
        };
        info!(
            attempted = summary.attempted,
            completed = summary.completed,
            failed = summary.failed,
            elapsed_secs = summary.elapsed.as_secs(),
            "Batch finished"
        );
        summary
    }
}

/// Runs one descriptor on its own task. A panic inside the run becomes a
/// persisted `error` result, reported and skipped on resume like any other
/// failed run.
async fn run_isolated(ctx: Arc<RunContext>, desc: RunDescriptor, local: bool) -> RunResult {
    let started_at = Utc::now();
    let handle = {
        let ctx = ctx.clone();
        let desc = desc.clone();
        tokio::spawn(async move { execute_and_score(&ctx, &desc, local).await })
    };

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(run_id = %desc.run_id, "Run {} aborted: {}", desc.label(), e);
            let result = RunResult {
                run_id: desc.run_id.clone(),
                spec_id: desc.spec_id.clone(),
                format: desc.format,
                tier: desc.tier,
                task_id: desc.task_id.clone(),
                model: ctx.runner.model().to_string(),
                doc_path: desc.doc.path.clone(),
                doc_url: desc.doc.url.clone(),
                execution: ExecutionRecord::error(format!("run task aborted: {}", e)),
                static_metrics: None,
                score: ScoreRecord::zero(),
                recording: None,
                started_at,
                finished_at: Utc::now(),
            };
            if let Err(e) = ctx.store.save(&result) {
                error!(run_id = %result.run_id, "Failed to persist result: {}", e);
            }
            result
        }
    }
}

/// Execute, measure, score, persist, export. Persisting happens before the
/// transcript export so a crash during export never loses the run.
async fn execute_and_score(ctx: &RunContext, desc: &RunDescriptor, local: bool) -> RunResult {
    let started_at = Utc::now();
    let outcome = ctx.runner.execute(desc, local).await;

    let metrics = desc.doc.path.as_deref().and_then(|path| match static_metrics(path) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            debug!("No static metrics for {}: {}", path.display(), e);
            None
        }
    });

    let score = if outcome.record.is_scorable() {
        score_run(
            &outcome.record.output_text,
            &desc.target_operations,
            &desc.expected_params,
            &ctx.weights,
        )
    } else {
        ScoreRecord::zero()
    };

    let mut result = RunResult {
        run_id: desc.run_id.clone(),
        spec_id: desc.spec_id.clone(),
        format: desc.format,
        tier: desc.tier,
        task_id: desc.task_id.clone(),
        model: ctx.runner.model().to_string(),
        doc_path: desc.doc.path.clone(),
        doc_url: desc.doc.url.clone(),
        execution: outcome.record,
        static_metrics: metrics,
        score,
        recording: outcome.transcript,
        started_at,
        finished_at: Utc::now(),
    };

    if let Err(e) = ctx.store.save(&result) {
        error!(run_id = %result.run_id, "Failed to persist result: {}", e);
        return result;
    }

    if let Some(recording) = result.recording.as_mut() {
        recording.exported =
            export_recording(&recording.source, &ctx.store.recordings_dir(), &desc.run_id);
        if recording.exported.is_some() {
            if let Err(e) = ctx.store.save(&result) {
                warn!(run_id = %result.run_id, "Failed to record transcript export: {}", e);
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::prompts::PromptTemplate;
    use crate::registry::{SizeClass, SpecFormat, Tier};
    use crate::runner::agents::{AgentAdapter, AgentInvocation, AgentOutput};
    use crate::runner::manifest::{run_id, DocArtifact};
    use crate::runner::result::RunStatus;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Answers by task description: `slow` sleeps first, `broken` exits 1,
    /// `hang` times out, `panic` panics, everything else answers with a
    /// matching endpoint.
    struct ScriptedAdapter;

    #[async_trait]
    impl AgentAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn run(&self, invocation: &AgentInvocation) -> Result<AgentOutput, ExecutorError> {
            let prompt = fs::read_to_string(&invocation.prompt_file)?;
            let ok = |code: i32, text: &str| -> Result<AgentOutput, ExecutorError> {
                Ok(AgentOutput::new(code, text.to_string(), String::new(), Duration::from_millis(1)))
            };
            if prompt.contains("hang") {
                tokio::time::sleep(Duration::from_millis(50)).await;
                return Err(ExecutorError::Timeout(invocation.timeout));
            }
            if prompt.contains("slow") {
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            if prompt.contains("broken") {
                return ok(1, "crashed");
            }
            if prompt.contains("panic") {
                panic!("scripted agent crash");
            }
            ok(0, r#"{"result": "Method: POST\nEndpoint: /v1/charges\n\n```json\n{\"amount\": 100}\n```"}"#)
        }
    }

    fn descriptor(task_id: &str) -> RunDescriptor {
        let mut expected_params = BTreeMap::new();
        expected_params.insert("POST /v1/charges".to_string(), vec!["amount".to_string()]);
        RunDescriptor {
            run_id: run_id("stripe", Tier::None, task_id),
            spec_id: "stripe".to_string(),
            format: SpecFormat::OpenApi,
            tier: Tier::None,
            task_id: task_id.to_string(),
            task_description: format!("task {}", task_id),
            target_operations: vec!["POST /v1/charges".to_string()],
            expected_params,
            doc: DocArtifact::default(),
            size_class: SizeClass::Small,
        }
    }

    fn orchestrator(sandboxes: &TempDir, batch: &TempDir, concurrency: usize) -> BatchOrchestrator {
        let runner = AgentRunner::new(
            Arc::new(ScriptedAdapter),
            PromptTemplate::new("{DOC_INSTRUCTION}\n{TASK}"),
            "test-model",
            sandboxes.path(),
        )
        .with_timeout(Duration::from_secs(2));
        BatchOrchestrator::new(runner, ScoreWeights::canonical(), CheckpointStore::new(batch.path()))
            .with_concurrency(concurrency)
    }

    #[tokio::test]
    async fn test_sequential_run_keeps_manifest_order() {
        let sandboxes = TempDir::new().unwrap();
        let batch = TempDir::new().unwrap();
        let orch = orchestrator(&sandboxes, &batch, 1);

        let manifest = vec![descriptor("slow"), descriptor("a"), descriptor("broken")];
        let mut seen = Vec::new();
        let summary = orch
            .run(manifest.clone(), |done, total, result| {
                assert_eq!(total, 3);
                seen.push((done, result.task_id.clone()));
            })
            .await;

        assert_eq!(
            seen,
            vec![(1, "slow".to_string()), (2, "a".to_string()), (3, "broken".to_string())]
        );
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);

        let stored = orch.store().load(&manifest[1].run_id).unwrap();
        assert_eq!(stored.execution.status, RunStatus::Completed);
        assert!((stored.score.endpoint - 1.0).abs() < 1e-9);
        assert!((stored.score.params - 1.0).abs() < 1e-9);

        let broken = orch.store().load(&manifest[2].run_id).unwrap();
        assert_eq!(broken.execution.status, RunStatus::Error);
        assert_eq!(broken.score, ScoreRecord::zero());
    }

    #[tokio::test]
    async fn test_parallel_reports_completion_order() {
        let sandboxes = TempDir::new().unwrap();
        let batch = TempDir::new().unwrap();
        let orch = orchestrator(&sandboxes, &batch, 3);

        let manifest = vec![descriptor("slow"), descriptor("hang"), descriptor("fast")];
        let mut order = Vec::new();
        let summary = orch
            .run(manifest.clone(), |_, _, result| order.push(result.task_id.clone()))
            .await;

        assert_eq!(order.len(), 3);
        assert_eq!(order.last().map(String::as_str), Some("slow"));
        assert_eq!(summary.failed, 1);
        assert_eq!(orch.store().completed_ids().len(), 3);

        let hung = orch.store().load(&manifest[1].run_id).unwrap();
        assert_eq!(hung.execution.status, RunStatus::Timeout);
        assert_eq!(hung.execution.wall_time_secs, 2.0);

        // every sandbox was removed
        assert!(fs::read_dir(sandboxes.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_pending_skips_terminal_runs() {
        let sandboxes = TempDir::new().unwrap();
        let batch = TempDir::new().unwrap();
        let orch = orchestrator(&sandboxes, &batch, 2);

        let manifest = vec![descriptor("a"), descriptor("b"), descriptor("c")];
        orch.run(vec![manifest[1].clone()], |_, _, _| {}).await;

        let pending = orch.pending(&manifest);
        let ids: Vec<&str> = pending.iter().map(|d| d.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let summary = orch.run(pending, |_, _, _| {}).await;
        assert_eq!(summary.attempted, 2);
        assert!(orch.pending(&manifest).is_empty());
    }

    #[tokio::test]
    async fn test_panicking_run_is_persisted_as_error() {
        let sandboxes = TempDir::new().unwrap();
        let batch = TempDir::new().unwrap();

        for concurrency in [1, 2] {
            let orch = orchestrator(&sandboxes, &batch, concurrency);
            let manifest = vec![descriptor(&format!("panic{}", concurrency)), descriptor("a")];
            let mut reported = Vec::new();
            let summary = orch
                .run(manifest.clone(), |_, _, result| {
                    reported.push((result.task_id.clone(), result.execution.status))
                })
                .await;

            assert_eq!(summary.attempted, 2);
            assert_eq!(summary.failed, 1);
            assert_eq!(reported.len(), 2);
            assert!(reported.contains(&(manifest[0].task_id.clone(), RunStatus::Error)));

            let crashed = orch.store().load(&manifest[0].run_id).unwrap();
            assert_eq!(crashed.execution.status, RunStatus::Error);
            assert!(crashed.execution.error.is_some());
            assert_eq!(crashed.score, ScoreRecord::zero());
        }
        assert!(fs::read_dir(sandboxes.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_pending_runs_without_orchestrator() {
        let batch = TempDir::new().unwrap();
        let store = CheckpointStore::new(batch.path().join("missing"));
        let manifest = vec![descriptor("a"), descriptor("b")];
        assert_eq!(pending_runs(&store, &manifest).len(), 2);
        assert!(!store.batch_dir().exists());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let sandboxes = TempDir::new().unwrap();
        let batch = TempDir::new().unwrap();
        let orch = orchestrator(&sandboxes, &batch, 3);

        let summary = orch.run(Vec::new(), |_, _, _| panic!("no runs")).await;
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.failed, 0);
    }
}
