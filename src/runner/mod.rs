//! Benchmark runner.
//!
//! Turns the spec registry and task manifests into run descriptors, executes
//! each descriptor against the external agent in a throwaway sandbox, and
//! checkpoints results in a batch directory so an interrupted batch can be
//! resumed.
//!
//! # Architecture
//!
//! ```text
//! Registry + Tasks → Run Manifest → Orchestrator → Executor → Agent Process
//!                                        │              │
//!                                        │              └→ Sandbox (deleted after the run)
//!                                        └→ Scoring → Checkpoint Store → <batch>/<run_id>.json
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docbench::runner::{AgentRunner, BatchOrchestrator, CheckpointStore};
//!
//! let runner = AgentRunner::from_config(&config, &paths, template);
//! let orchestrator = BatchOrchestrator::new(runner, weights, CheckpointStore::new(batch_dir))
//!     .with_concurrency(3);
//!
//! let pending = orchestrator.pending(&manifest);
//! let summary = orchestrator.run(pending, |done, total, result| {
//!     println!("[{}/{}] {} -> {}", done, total, result.label(), result.execution.status);
//! }).await;
//! ```

pub mod agents;
pub mod checkpoint;
pub mod config;
pub mod executor;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod result;
pub mod sandbox;
pub mod transcript;

pub use agents::{AgentAdapter, AgentInvocation, AgentOutput, ClaudeCliAdapter, ParsedOutput};
pub use checkpoint::{batch_timestamp, BatchManifestRecord, CheckpointStore};
pub use config::{BenchConfig, ResolvedPaths};
pub use executor::{AgentRunner, ExecutionOutcome};
pub use manifest::{
    build_run_manifest, run_id, ArtifactResolver, CompiledLayout, DocArtifact, ManifestFilter,
    RunDescriptor,
};
pub use orchestrator::{pending_runs, BatchOrchestrator, BatchSummary};
pub use progress::{ProgressCounters, ProgressMonitor};
pub use result::{ExecutionRecord, RecordingRef, RunResult, RunStatus, TokenUsage};
pub use sandbox::Sandbox;
