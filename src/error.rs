//! Error types for docbench operations.
//!
//! Defines error types for the subsystems that can fail loudly:
//! - Bench configuration and prompt templates
//! - Spec registry and task manifests
//! - Checkpoint persistence
//! - Run execution (folded into a run status, never surfaced to the batch)

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Configuration-level failures. These abort a command before any dispatch.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Scoring weights must sum to 1.0 (endpoint={endpoint}, param={param}, code={code})")]
    InvalidWeights { endpoint: f64, param: f64, code: f64 },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Batch not found: {0}")]
    BatchNotFound(PathBuf),
}

/// Errors that can occur while loading the spec registry or task manifests.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry file not found: {0}")]
    NotFound(PathBuf),

    #[error("Spec '{0}' not found in registry")]
    UnknownSpec(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors from the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to commit {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures inside a single run. The executor converts these into a
/// terminal run status; they never abort a batch.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Sandbox setup failed: {0}")]
    Sandbox(String),

    #[error("Documentation artifact unavailable: {0}")]
    MissingArtifact(String),

    #[error("Failed to spawn agent '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
