//! Batch directory persistence.
//!
//! A batch directory holds `manifest.json`, one `<run_id>.json` per finished
//! run and a `recordings/` subdirectory. Writing a run's file is the commit
//! point of that run; files are written through a temp file and renamed so
//! a crash never leaves a half-written result under the final name.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::manifest::ManifestFilter;
use super::result::{RunResult, RunStatus};
use crate::error::CheckpointError;
use crate::scoring::normalize::cached;

/// Name of the batch summary record.
pub const BATCH_MANIFEST_FILE: &str = "manifest.json";
/// Subdirectory for exported transcripts.
pub const RECORDINGS_DIR: &str = "recordings";

static STATUS_FIELD: OnceLock<Regex> = OnceLock::new();

/// Summary record of a batch, rewritten on every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifestRecord {
    pub batch_id: String,
    pub created: DateTime<Utc>,
    pub model: String,
    /// Filter the manifest was built with.
    #[serde(default)]
    pub filter: ManifestFilter,
    pub total_runs: usize,
    pub pending_runs: usize,
    /// Runs already terminal when this invocation started.
    pub completed_runs: usize,
}

/// Batch id for a start time: the UTC timestamp `%Y%m%d_%H%M%S`.
pub fn batch_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Reads and writes one batch directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    batch_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(batch_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_dir: batch_dir.into(),
        }
    }

    /// Creates a fresh batch directory under `results_dir` and returns its id.
    ///
    /// The id is the start timestamp; if another batch already owns that
    /// directory, `_2`, `_3`, ... are appended until one can be created.
    pub fn create_batch(
        results_dir: &Path,
        now: DateTime<Utc>,
    ) -> Result<(String, Self), CheckpointError> {
        fs::create_dir_all(results_dir)?;
        let base = batch_timestamp(now);
        let mut attempt = 1u32;
        loop {
            let batch_id = match attempt {
                1 => base.clone(),
                n => format!("{}_{}", base, n),
            };
            let dir = results_dir.join(&batch_id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((batch_id, Self::new(dir))),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn batch_dir(&self) -> &Path {
        &self.batch_dir
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.batch_dir.join(RECORDINGS_DIR)
    }

    pub fn result_path(&self, run_id: &str) -> PathBuf {
        self.batch_dir.join(format!("{}.json", run_id))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.batch_dir)?;
        let mut tmp = NamedTempFile::new_in(&self.batch_dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CheckpointError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Commits a run result, replacing any earlier file for the same run.
    pub fn save(&self, result: &RunResult) -> Result<PathBuf, CheckpointError> {
        let path = self.result_path(&result.run_id);
        let json = serde_json::to_vec_pretty(result)?;
        self.write_atomic(&path, &json)?;
        debug!(run_id = %result.run_id, "Saved result to {}", path.display());
        Ok(path)
    }

    /// Loads one run result.
    pub fn load(&self, run_id: &str) -> Result<RunResult, CheckpointError> {
        let bytes = fs::read(self.result_path(run_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn result_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.batch_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name().is_some_and(|name| name != BATCH_MANIFEST_FILE)
            })
            .collect();
        files.sort();
        files
    }

    /// Status of a result file. Files that do not parse fall back to the
    /// first `"status": "<word>"` found in their text.
    fn file_status(path: &Path) -> Option<(String, RunStatus)> {
        let text = fs::read_to_string(path).ok()?;
        let stem = path.file_stem()?.to_string_lossy().into_owned();

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
            let run_id = value
                .get("run_id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(stem);
            let status = value
                .get("execution")
                .and_then(|e| e.get("status"))
                .and_then(|s| s.as_str())
                .and_then(RunStatus::parse)?;
            return Some((run_id, status));
        }

        let re = cached(&STATUS_FIELD, r#""status"\s*:\s*"(\w+)""#);
        let status = re
            .captures(&text)
            .and_then(|c| c.get(1))
            .and_then(|m| RunStatus::parse(m.as_str()))?;
        warn!("Result file {} is corrupt; using its status '{}'", path.display(), status);
        Some((stem, status))
    }

    /// Run ids whose persisted status is terminal. Unreadable files count as
    /// not done.
    pub fn completed_ids(&self) -> HashSet<String> {
        self.result_files()
            .iter()
            .filter_map(|path| Self::file_status(path))
            .filter(|(_, status)| status.is_terminal())
            .map(|(run_id, _)| run_id)
            .collect()
    }

    /// Every result that deserializes. Corrupt files are logged and skipped.
    pub fn load_all(&self) -> Vec<RunResult> {
        self.result_files()
            .iter()
            .filter_map(|path| {
                let bytes = fs::read(path).ok()?;
                match serde_json::from_slice::<RunResult>(&bytes) {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!("Skipping unreadable result {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }

    pub fn write_batch_manifest(&self, record: &BatchManifestRecord) -> Result<(), CheckpointError> {
        let json = serde_json::to_vec_pretty(record)?;
        self.write_atomic(&self.batch_dir.join(BATCH_MANIFEST_FILE), &json)
    }

    pub fn read_batch_manifest(&self) -> Result<BatchManifestRecord, CheckpointError> {
        let bytes = fs::read(self.batch_dir.join(BATCH_MANIFEST_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
