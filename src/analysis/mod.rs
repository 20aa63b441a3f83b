//! Batch analysis: score aggregates, compression trade-offs, CSV export and
//! re-scoring of persisted runs.
//!
//! Aggregate scores are rounded to three decimals.

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CheckpointError;
use crate::registry::{SizeClass, SpecFormat, TaskCatalog, Tier};
use crate::runner::checkpoint::CheckpointStore;
use crate::runner::result::RunResult;
use crate::runner::transcript::parse_transcript;
use crate::scoring::{score_run, ScoreWeights};

/// A run counts as a success at or above this total score.
pub const SUCCESS_THRESHOLD: f64 = 0.7;

/// Documents below this many bytes are small.
pub const SMALL_DOC_BYTES: u64 = 50_000;
/// Documents below this many bytes (and not small) are medium.
pub const MEDIUM_DOC_BYTES: u64 = 500_000;

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Score aggregate of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSummary {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Share of runs scoring at least [`SUCCESS_THRESHOLD`].
    pub success_rate: f64,
}

/// Aggregates total scores by tier.
pub fn tier_summary(results: &[RunResult]) -> BTreeMap<Tier, TierSummary> {
    let mut by_tier: BTreeMap<Tier, Vec<f64>> = BTreeMap::new();
    for result in results {
        by_tier.entry(result.tier).or_default().push(result.score.total);
    }

    by_tier
        .into_iter()
        .map(|(tier, scores)| {
            let count = scores.len();
            let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let successes = scores.iter().filter(|&&s| s >= SUCCESS_THRESHOLD).count();
            (
                tier,
                TierSummary {
                    count,
                    avg: round3(mean(&scores)),
                    min: round3(min),
                    max: round3(max),
                    success_rate: round3(successes as f64 / count as f64),
                },
            )
        })
        .collect()
}

/// Run count and average total score of a group of runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreGroup {
    pub count: usize,
    pub avg: f64,
}

impl ScoreGroup {
    fn of(scores: &[f64]) -> Self {
        Self {
            count: scores.len(),
            avg: round3(mean(scores)),
        }
    }
}

/// Aggregates total scores by spec format.
pub fn format_summary(results: &[RunResult]) -> BTreeMap<SpecFormat, ScoreGroup> {
    let mut by_format: BTreeMap<SpecFormat, Vec<f64>> = BTreeMap::new();
    for result in results {
        by_format.entry(result.format).or_default().push(result.score.total);
    }
    by_format
        .into_iter()
        .map(|(format, scores)| (format, ScoreGroup::of(&scores)))
        .collect()
}

/// Size class of a document from its byte size. Runs without a document
/// count as zero bytes.
pub fn size_class_for_bytes(doc_bytes: u64) -> SizeClass {
    if doc_bytes < SMALL_DOC_BYTES {
        SizeClass::Small
    } else if doc_bytes < MEDIUM_DOC_BYTES {
        SizeClass::Medium
    } else {
        SizeClass::Large
    }
}

/// Per-tier score groups for each document size class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeClassSummary {
    pub small: BTreeMap<Tier, ScoreGroup>,
    pub medium: BTreeMap<Tier, ScoreGroup>,
    pub large: BTreeMap<Tier, ScoreGroup>,
}

impl SizeClassSummary {
    /// Classes from smallest to largest.
    pub fn classes(&self) -> [(SizeClass, &BTreeMap<Tier, ScoreGroup>); 3] {
        [
            (SizeClass::Small, &self.small),
            (SizeClass::Medium, &self.medium),
            (SizeClass::Large, &self.large),
        ]
    }
}

/// Aggregates total scores by the measured size of the delivered document,
/// then by tier.
pub fn size_class_summary(results: &[RunResult]) -> SizeClassSummary {
    let mut by_class: [BTreeMap<Tier, Vec<f64>>; 3] = Default::default();
    for result in results {
        let bytes = result.static_metrics.map_or(0, |m| m.doc_bytes);
        let slot = match size_class_for_bytes(bytes) {
            SizeClass::Small => 0,
            SizeClass::Medium => 1,
            SizeClass::Large => 2,
        };
        by_class[slot].entry(result.tier).or_default().push(result.score.total);
    }

    let [small, medium, large] = by_class.map(|tiers| {
        tiers
            .into_iter()
            .map(|(tier, scores)| (tier, ScoreGroup::of(&scores)))
            .collect::<BTreeMap<Tier, ScoreGroup>>()
    });
    SizeClassSummary {
        small,
        medium,
        large,
    }
}

/// How one tier of a spec compares with its `pretty` tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTradeoff {
    /// `1 - tokens / pretty_tokens`; zero when the pretty token count is
    /// unknown.
    pub token_savings: f64,
    /// `score - pretty_score`.
    pub score_delta: f64,
    /// Average total score of the tier.
    pub score: f64,
}

#[derive(Default)]
struct SpecTierStats {
    scores: Vec<f64>,
    tokens: u64,
}

/// Token savings against score change per spec and tier, relative to the
/// spec's `pretty` tier. Specs without a `pretty` run are skipped. Scores of
/// several tasks on the same spec and tier are averaged.
pub fn compression_analysis(results: &[RunResult]) -> BTreeMap<String, BTreeMap<Tier, TierTradeoff>> {
    let mut by_spec: BTreeMap<&str, BTreeMap<Tier, SpecTierStats>> = BTreeMap::new();
    for result in results {
        let stats = by_spec
            .entry(result.spec_id.as_str())
            .or_default()
            .entry(result.tier)
            .or_default();
        stats.scores.push(result.score.total);
        if let Some(metrics) = result.static_metrics {
            stats.tokens = metrics.doc_tokens;
        }
    }

    by_spec
        .into_iter()
        .filter_map(|(spec_id, tiers)| {
            let pretty = tiers.get(&Tier::Pretty)?;
            let pretty_score = mean(&pretty.scores);
            let pretty_tokens = pretty.tokens;

            let tradeoffs = tiers
                .iter()
                .filter(|(tier, _)| **tier != Tier::Pretty)
                .map(|(tier, stats)| {
                    let score = mean(&stats.scores);
                    let token_savings = if pretty_tokens > 0 {
                        round3(1.0 - stats.tokens as f64 / pretty_tokens as f64)
                    } else {
                        0.0
                    };
                    (
                        *tier,
                        TierTradeoff {
                            token_savings,
                            score_delta: round3(score - pretty_score),
                            score,
                        },
                    )
                })
                .collect();
            Some((spec_id.to_string(), tradeoffs))
        })
        .collect()
}

/// Every aggregate of a batch, as written by `summarize --json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub batch_id: String,
    pub total_runs: usize,
    pub tier_summary: BTreeMap<Tier, TierSummary>,
    pub format_summary: BTreeMap<SpecFormat, ScoreGroup>,
    pub size_class_summary: SizeClassSummary,
    pub compression_analysis: BTreeMap<String, BTreeMap<Tier, TierTradeoff>>,
}

impl BatchAnalysis {
    pub fn new(batch_id: impl Into<String>, results: &[RunResult]) -> Self {
        Self {
            batch_id: batch_id.into(),
            total_runs: results.len(),
            tier_summary: tier_summary(results),
            format_summary: format_summary(results),
            size_class_summary: size_class_summary(results),
            compression_analysis: compression_analysis(results),
        }
    }
}

/// One line of the CSV export.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    run_id: &'a str,
    spec_id: &'a str,
    format: SpecFormat,
    tier: Tier,
    task_id: &'a str,
    score_total: f64,
    score_endpoint: f64,
    score_params: f64,
    score_code: f64,
    doc_bytes: u64,
    doc_tokens: u64,
    wall_time_s: f64,
    status: String,
}

/// Writes one CSV row per run, with a header line. Returns the row count.
pub fn export_csv<W: io::Write>(results: &[RunResult], writer: W) -> Result<usize, csv::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for result in results {
        let metrics = result.static_metrics.unwrap_or_default();
        csv_writer.serialize(CsvRow {
            run_id: &result.run_id,
            spec_id: &result.spec_id,
            format: result.format,
            tier: result.tier,
            task_id: &result.task_id,
            score_total: result.score.total,
            score_endpoint: result.score.endpoint,
            score_params: result.score.params,
            score_code: result.score.code,
            doc_bytes: metrics.doc_bytes,
            doc_tokens: metrics.doc_tokens,
            wall_time_s: result.execution.wall_time_secs,
            status: result.execution.status.to_string(),
        })?;
    }
    csv_writer.flush()?;
    Ok(results.len())
}

/// Outcome of re-scoring a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RescoreReport {
    pub rescored: usize,
    /// Runs with no output text and no usable transcript.
    pub skipped_no_text: usize,
    /// Runs whose task is no longer in the task manifests.
    pub skipped_unknown_task: usize,
}

/// Text to score for a persisted run: its output, else the final assistant
/// message of its exported transcript.
fn scorable_text(result: &RunResult) -> Option<String> {
    if !result.execution.output_text.trim().is_empty() {
        return Some(result.execution.output_text.clone());
    }
    let exported = result.recording.as_ref()?.exported.as_deref()?;
    match parse_transcript(exported) {
        Ok(summary) if !summary.final_text.trim().is_empty() => {
            debug!(run_id = %result.run_id, "Scoring transcript text of {}", exported.display());
            Some(summary.final_text)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Failed to read transcript {}: {}", exported.display(), e);
            None
        }
    }
}

/// Re-scores every persisted run of a batch with the given weights and the
/// current task manifests, rewriting each result file.
pub fn rescore_batch(
    store: &CheckpointStore,
    catalog: &TaskCatalog,
    weights: &ScoreWeights,
) -> Result<RescoreReport, CheckpointError> {
    let mut report = RescoreReport::default();

    for mut result in store.load_all() {
        let Some(task) = catalog
            .get(&result.spec_id)
            .and_then(|manifest| manifest.task(&result.task_id))
        else {
            warn!(run_id = %result.run_id, "No task {} for spec {}", result.task_id, result.spec_id);
            report.skipped_unknown_task += 1;
            continue;
        };

        let Some(text) = scorable_text(&result) else {
            report.skipped_no_text += 1;
            continue;
        };

        let before = result.score.total;
        result.score = score_run(&text, &task.target_endpoints, &task.expected_params, weights);
        debug!(
            run_id = %result.run_id,
            before = before,
            after = result.score.total,
            "Rescored {}",
            result.label()
        );
        store.save(&result)?;
        report.rescored += 1;
    }

    info!(
        rescored = report.rescored,
        skipped_no_text = report.skipped_no_text,
        skipped_unknown_task = report.skipped_unknown_task,
        "Rescore finished for {}",
        store.batch_dir().display()
    );
    Ok(report)
}
