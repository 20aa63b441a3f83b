//! CLI command definitions for docbench.
//!
//! Every command loads the bench config and the spec registry up front, so
//! configuration problems fail before anything is dispatched. Per-run
//! failures never change the exit code.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};

use crate::analysis::{export_csv, rescore_batch, BatchAnalysis};
use crate::error::ConfigError;
use crate::metrics::compare_tiers;
use crate::prompts::PromptTemplate;
use crate::registry::{load_task_catalog, Registry, SpecFormat, TaskCatalog, Tier};
use crate::runner::checkpoint::{batch_timestamp, BatchManifestRecord};
use crate::runner::config::{BenchConfig, ResolvedPaths};
use crate::runner::{
    build_run_manifest, pending_runs, AgentRunner, BatchOrchestrator, CheckpointStore,
    CompiledLayout, ManifestFilter, RunDescriptor, RunResult,
};

/// Config location relative to `--root` when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "harness/config.yaml";

/// Benchmark runner for agents working from compressed API documentation.
#[derive(Parser)]
#[command(name = "docbench")]
#[command(about = "Run and score agent benchmarks across documentation compression tiers")]
#[command(version)]
#[command(
    long_about = "docbench runs an agent CLI against API integration tasks, giving it the API documentation in different compression tiers, and scores each answer against the expected operations and parameters.\n\nResults are checkpointed per run so an interrupted batch can be resumed.\n\nExample usage:\n  docbench run --pilot --concurrency 3\n  docbench resume 20250101_120000"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Project root that relative config paths resolve against.
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Bench config file (default: <root>/harness/config.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Start a new batch.
    Run(RunArgs),

    /// Continue a batch, skipping runs that already finished.
    Resume(ResumeArgs),

    /// Re-score every run of a batch with the current scorer and weights.
    Rescore(BatchArgs),

    /// Print score aggregates of a batch by tier, format and size class.
    Summarize(SummarizeArgs),

    /// Compare document size across the compiled tiers of a spec.
    Metrics(MetricsArgs),
}

/// Options shared by `run` and `resume`.
#[derive(clap::Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Concurrent agent runs (default: from config).
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Copy documents into the sandbox instead of giving the agent a URL.
    #[arg(long)]
    pub local: bool,

    /// Print the pending runs and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `docbench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Small smoke-test subset: two specs per size class, six at most.
    #[arg(long)]
    pub pilot: bool,

    /// Only this spec.
    #[arg(long)]
    pub spec: Option<String>,

    /// Only specs of this format.
    #[arg(long)]
    pub format: Option<SpecFormat>,

    /// Only this tier.
    #[arg(long)]
    pub tier: Option<Tier>,

    /// Only this task id.
    #[arg(long)]
    pub task: Option<String>,

    #[command(flatten)]
    pub exec: ExecutionArgs,
}

/// Arguments for `docbench resume`.
#[derive(Parser, Debug)]
pub struct ResumeArgs {
    /// Batch to resume.
    pub batch_id: String,

    #[command(flatten)]
    pub exec: ExecutionArgs,
}

/// Arguments naming one batch.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    pub batch_id: String,
}

/// Arguments for `docbench summarize`.
#[derive(Parser, Debug)]
pub struct SummarizeArgs {
    pub batch_id: String,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,

    /// Also write one CSV row per run to this file.
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,
}

/// Arguments for `docbench metrics`.
#[derive(Parser, Debug)]
pub struct MetricsArgs {
    pub spec_id: String,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let bench = BenchContext::load(&cli.root, cli.config.as_deref())?;
    match cli.command {
        Commands::Run(args) => run_command(&bench, args).await,
        Commands::Resume(args) => resume_command(&bench, args).await,
        Commands::Rescore(args) => rescore_command(&bench, args),
        Commands::Summarize(args) => summarize_command(&bench, args),
        Commands::Metrics(args) => metrics_command(&bench, args),
    }
}

// ============================================================================
// Shared setup
// ============================================================================

/// Configuration and read-only inputs, loaded once per invocation.
struct BenchContext {
    config: BenchConfig,
    paths: ResolvedPaths,
    registry: Registry,
}

impl BenchContext {
    fn load(root: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config_path {
            Some(path) => BenchConfig::load(&root.join(path))?,
            None => {
                let path = root.join(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    BenchConfig::load(&path)?
                } else {
                    warn!("No config at {}, using defaults", path.display());
                    BenchConfig::default()
                }
            }
        };
        let paths = config.paths.resolve(root);
        let registry = Registry::load(&paths.registry)?;
        info!(
            "Loaded {} specs from {}",
            registry.len(),
            paths.registry.display()
        );
        Ok(Self {
            config,
            paths,
            registry,
        })
    }

    fn catalog(&self) -> anyhow::Result<TaskCatalog> {
        Ok(load_task_catalog(&self.registry, &self.paths.manifests_dir)?)
    }

    fn layout(&self) -> CompiledLayout {
        let layout = CompiledLayout::new(self.paths.compiled_dir.clone());
        if self.config.github.is_none() {
            return layout;
        }
        let config = self.config.clone();
        layout.with_remote(move |format, spec_id, tier| config.doc_url(format, spec_id, tier))
    }

    fn existing_store(&self, batch_id: &str) -> anyhow::Result<CheckpointStore> {
        let dir = self.paths.batch_dir(batch_id);
        if !dir.is_dir() {
            return Err(ConfigError::BatchNotFound(dir).into());
        }
        Ok(CheckpointStore::new(dir))
    }
}

// ============================================================================
// run / resume
// ============================================================================

async fn run_command(bench: &BenchContext, args: RunArgs) -> anyhow::Result<()> {
    let filter = ManifestFilter {
        spec: args.spec,
        format: args.format,
        tier: args.tier,
        task: args.task,
        pilot: args.pilot,
    };
    if let Some(spec) = &filter.spec {
        bench.registry.require(spec)?;
    }
    execute_batch(bench, BatchTarget::New, filter, &args.exec).await
}

async fn resume_command(bench: &BenchContext, args: ResumeArgs) -> anyhow::Result<()> {
    let store = bench.existing_store(&args.batch_id)?;
    let filter = match store.read_batch_manifest() {
        Ok(record) => {
            if record.model != bench.config.model {
                warn!(
                    "Batch {} was started with model {}, resuming with {}",
                    args.batch_id, record.model, bench.config.model
                );
            }
            record.filter
        }
        Err(e) => {
            warn!("Could not read batch manifest, resuming unfiltered: {}", e);
            ManifestFilter::default()
        }
    };
    let target = BatchTarget::Existing {
        batch_id: args.batch_id,
        store,
    };
    execute_batch(bench, target, filter, &args.exec).await
}

/// Batch a `run` or `resume` invocation writes into.
enum BatchTarget {
    /// A fresh batch; its directory is claimed only once the run is ready
    /// to dispatch.
    New,
    Existing {
        batch_id: String,
        store: CheckpointStore,
    },
}

async fn execute_batch(
    bench: &BenchContext,
    target: BatchTarget,
    filter: ManifestFilter,
    exec: &ExecutionArgs,
) -> anyhow::Result<()> {
    let catalog = bench.catalog()?;
    let manifest = build_run_manifest(
        &bench.registry,
        &catalog,
        &bench.layout(),
        &bench.config.tiers,
        &filter,
    );

    let pending = match &target {
        BatchTarget::New => manifest.clone(),
        BatchTarget::Existing { store, .. } => pending_runs(store, &manifest),
    };
    let already_done = manifest.len() - pending.len();

    if exec.dry_run {
        let preview_id = match &target {
            BatchTarget::New => batch_timestamp(Utc::now()),
            BatchTarget::Existing { batch_id, .. } => batch_id.clone(),
        };
        print_batch_header(&preview_id, manifest.len(), pending.len(), already_done);
        print_manifest(&pending);
        return Ok(());
    }

    let concurrency = exec.concurrency.unwrap_or(bench.config.concurrency).max(1);
    let template = PromptTemplate::load(&bench.paths.prompt_template)?;
    let weights = bench.config.scoring.weights()?;
    let (batch_id, store) = match target {
        BatchTarget::New => CheckpointStore::create_batch(&bench.paths.results_dir, Utc::now())?,
        BatchTarget::Existing { batch_id, store } => (batch_id, store),
    };
    print_batch_header(&batch_id, manifest.len(), pending.len(), already_done);

    let runner = AgentRunner::from_config(&bench.config, &bench.paths, template);
    let orchestrator = BatchOrchestrator::new(runner, weights, store)
        .with_concurrency(concurrency)
        .with_local_delivery(exec.local)
        .with_progress_interval(bench.config.progress_interval());

    orchestrator.store().write_batch_manifest(&BatchManifestRecord {
        batch_id: batch_id.clone(),
        created: Utc::now(),
        model: bench.config.model.clone(),
        filter,
        total_runs: manifest.len(),
        pending_runs: pending.len(),
        completed_runs: already_done,
    })?;

    if pending.is_empty() {
        println!("Nothing to run.");
        return Ok(());
    }

    println!("Running with concurrency={}", concurrency);
    let summary = orchestrator.run(pending, print_completion).await;

    println!(
        "\nDone in {:.1}s. Completed: {}, Failed: {}",
        summary.elapsed.as_secs_f64(),
        summary.completed,
        summary.failed
    );
    println!("Results: {}", orchestrator.store().batch_dir().display());
    Ok(())
}

fn print_batch_header(batch_id: &str, total: usize, pending: usize, already_done: usize) {
    println!("Batch: {}", batch_id);
    println!("Total runs: {}", total);
    println!("Pending: {}", pending);
    println!("Already completed: {}", already_done);
}

fn print_manifest(runs: &[RunDescriptor]) {
    for run in runs {
        println!("  [{}] {} ({})", run.run_id, run.label(), run.size_class);
    }
}

fn print_completion(done: usize, total: usize, result: &RunResult) {
    println!(
        "  [{}/{}] {} -> {} (score={:.2})",
        done,
        total,
        result.label(),
        result.execution.status,
        result.score.total
    );
}

// ============================================================================
// rescore / summarize / metrics
// ============================================================================

fn rescore_command(bench: &BenchContext, args: BatchArgs) -> anyhow::Result<()> {
    let store = bench.existing_store(&args.batch_id)?;
    let catalog = bench.catalog()?;
    let weights = bench.config.scoring.weights()?;

    let report = rescore_batch(&store, &catalog, &weights)?;

    println!("\n=== Rescore Results ===");
    println!("Rescored:             {}", report.rescored);
    println!("Skipped (no text):    {}", report.skipped_no_text);
    println!("Skipped (no task):    {}", report.skipped_unknown_task);
    Ok(())
}

fn summarize_command(bench: &BenchContext, args: SummarizeArgs) -> anyhow::Result<()> {
    let store = bench.existing_store(&args.batch_id)?;
    let results = store.load_all();
    let analysis = BatchAnalysis::new(&args.batch_id, &results);

    if let Some(path) = &args.csv {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let rows = export_csv(&results, fs::File::create(path)?)?;
        info!("Exported {} results to {}", rows, path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    let completed = results.iter().filter(|r| r.is_success()).count();
    println!("\n=== Batch {} ===", args.batch_id);
    println!("Runs:      {}", results.len());
    println!("Completed: {}", completed);
    println!("Failed:    {}", results.len() - completed);

    println!("\nTier comparison:");
    println!(
        "  {:<14} {:>5} {:>7} {:>7} {:>7} {:>9}",
        "tier", "runs", "avg", "min", "max", "success"
    );
    for (tier, s) in &analysis.tier_summary {
        println!(
            "  {:<14} {:>5} {:>7.3} {:>7.3} {:>7.3} {:>8.1}%",
            tier.as_str(),
            s.count,
            s.avg,
            s.min,
            s.max,
            s.success_rate * 100.0
        );
    }

    println!("\nFormat breakdown:");
    println!("  {:<14} {:>5} {:>7}", "format", "runs", "avg");
    for (format, group) in &analysis.format_summary {
        println!("  {:<14} {:>5} {:>7.3}", format.as_str(), group.count, group.avg);
    }

    println!("\nSize class x tier:");
    for (class, tiers) in analysis.size_class_summary.classes() {
        if tiers.is_empty() {
            continue;
        }
        let cells: Vec<String> = tiers
            .iter()
            .map(|(tier, g)| format!("{}={:.3}(n={})", tier.as_str(), g.avg, g.count))
            .collect();
        println!("  {:<8}: {}", class.to_string(), cells.join(", "));
    }

    if !analysis.compression_analysis.is_empty() {
        println!("\nCompression vs pretty:");
        println!(
            "  {:<20} {:<14} {:>8} {:>8} {:>7}",
            "spec", "tier", "savings", "delta", "score"
        );
        for (spec_id, tiers) in &analysis.compression_analysis {
            for (tier, t) in tiers {
                println!(
                    "  {:<20} {:<14} {:>7.1}% {:>+8.3} {:>7.3}",
                    spec_id,
                    tier.as_str(),
                    t.token_savings * 100.0,
                    t.score_delta,
                    t.score
                );
            }
        }
    }
    Ok(())
}

fn metrics_command(bench: &BenchContext, args: MetricsArgs) -> anyhow::Result<()> {
    let meta = bench.registry.require(&args.spec_id)?;
    let layout = bench.layout();
    let tier_paths: Vec<(Tier, PathBuf)> = Tier::COMPILED
        .iter()
        .filter_map(|&tier| {
            layout
                .artifact_path(&args.spec_id, meta.format, tier)
                .map(|path| (tier, path))
        })
        .collect();
    let metrics = compare_tiers(&tier_paths);

    println!("\n=== {} ({}) ===", args.spec_id, meta.format);
    println!(
        "  {:<14} {:>10} {:>10} {:>8}",
        "tier", "bytes", "tokens", "ratio"
    );
    for (tier, m) in &metrics {
        println!(
            "  {:<14} {:>10} {:>10} {:>7.2}x",
            tier.as_str(),
            m.doc_bytes,
            m.doc_tokens,
            m.compression_ratio
        );
    }
    Ok(())
}
