//! Bench configuration.
//!
//! Loaded once at startup from YAML and passed down explicitly. All paths
//! are relative to the project root given on the command line.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::registry::{SpecFormat, Tier};
use crate::scoring::ScoreWeights;

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_timeout_seconds() -> u64 {
    180
}

fn default_concurrency() -> usize {
    3
}

fn default_progress_interval_seconds() -> u64 {
    60
}

fn default_tiers() -> Vec<Tier> {
    Tier::COMPILED.to_vec()
}

/// Configuration of a benchmark batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Model identifier passed to the agent.
    #[serde(default = "default_model")]
    pub model: String,
    /// Hard wall-clock budget per run.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Number of runs executing at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds between progress log lines during a batch.
    #[serde(default = "default_progress_interval_seconds")]
    pub progress_interval_seconds: u64,
    /// Tiers to run, in dispatch order.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    /// Remote hosting of compiled documents. Without it every run uses
    /// local delivery.
    #[serde(default)]
    pub github: Option<GithubSettings>,
    #[serde(default)]
    pub paths: PathSettings,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            timeout_seconds: default_timeout_seconds(),
            concurrency: default_concurrency(),
            progress_interval_seconds: default_progress_interval_seconds(),
            tiers: default_tiers(),
            agent: AgentSettings::default(),
            scoring: ScoringSettings::default(),
            github: None,
            paths: PathSettings::default(),
        }
    }
}

impl BenchConfig {
    /// Loads and validates a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.agent.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "agent.command".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.scoring.weights()?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Remote URL of a compiled document, if remote hosting is configured
    /// and the tier has a document.
    pub fn doc_url(&self, format: SpecFormat, spec_id: &str, tier: Tier) -> Option<String> {
        let github = self.github.as_ref()?;
        let file = tier.artifact_filename(format)?;
        Some(github.url_for(format, spec_id, &file))
    }

    /// Interval between batch progress log lines.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_seconds.max(1))
    }
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_allowed_tools() -> Vec<String> {
    ["Bash", "Read", "Write", "Glob", "Grep", "WebFetch"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// How the agent executable is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placed before the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,
    /// Extra environment for the agent process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            allowed_tools: default_allowed_tools(),
            env: BTreeMap::new(),
        }
    }
}

/// Scoring weights, given as a preset and/or explicit values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringSettings {
    /// `canonical` (0.6/0.3/0.1) or `balanced` (0.35/0.30/0.35).
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub endpoint_weight: Option<f64>,
    #[serde(default)]
    pub param_weight: Option<f64>,
    #[serde(default)]
    pub code_weight: Option<f64>,
}

impl ScoringSettings {
    /// Resolves the effective weights. Explicit values override the preset.
    pub fn weights(&self) -> Result<ScoreWeights, ConfigError> {
        let base = match self.preset.as_deref() {
            None => ScoreWeights::canonical(),
            Some(name) => ScoreWeights::preset(name).ok_or_else(|| ConfigError::InvalidValue {
                field: "scoring.preset".to_string(),
                reason: format!("unknown preset '{}'", name),
            })?,
        };
        ScoreWeights::new(
            self.endpoint_weight.unwrap_or(base.endpoint_weight),
            self.param_weight.unwrap_or(base.param_weight),
            self.code_weight.unwrap_or(base.code_weight),
        )
    }
}

/// Raw-file hosting of the compiled documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    pub base_url: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl GithubSettings {
    /// `<base_url>/<repo>/<branch>/compiled/<format>/<spec_id>/<file>`
    pub fn url_for(&self, format: SpecFormat, spec_id: &str, file: &str) -> String {
        format!(
            "{}/{}/{}/compiled/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.repo,
            self.branch,
            format,
            spec_id,
            file
        )
    }
}

/// Project-relative locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub registry: PathBuf,
    pub manifests_dir: PathBuf,
    pub compiled_dir: PathBuf,
    pub results_dir: PathBuf,
    pub prompt_template: PathBuf,
    /// Parent of run sandboxes; the system temp dir when unset.
    pub sandbox_root: Option<PathBuf>,
    /// Agent session transcript store; `$HOME/.claude/projects` when unset.
    pub transcript_dir: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            registry: PathBuf::from("registry/registry.yaml"),
            manifests_dir: PathBuf::from("registry/manifests"),
            compiled_dir: PathBuf::from("compiled"),
            results_dir: PathBuf::from("results/runs"),
            prompt_template: PathBuf::from("prompts/template.md"),
            sandbox_root: None,
            transcript_dir: None,
        }
    }
}

/// [`PathSettings`] resolved against a project root.
#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub registry: PathBuf,
    pub manifests_dir: PathBuf,
    pub compiled_dir: PathBuf,
    pub results_dir: PathBuf,
    pub prompt_template: PathBuf,
    pub sandbox_root: PathBuf,
    pub transcript_dir: Option<PathBuf>,
}

impl PathSettings {
    pub fn resolve(&self, root: &Path) -> ResolvedPaths {
        ResolvedPaths {
            registry: root.join(&self.registry),
            manifests_dir: root.join(&self.manifests_dir),
            compiled_dir: root.join(&self.compiled_dir),
            results_dir: root.join(&self.results_dir),
            prompt_template: root.join(&self.prompt_template),
            sandbox_root: self
                .sandbox_root
                .as_ref()
                .map(|p| root.join(p))
                .unwrap_or_else(std::env::temp_dir),
            transcript_dir: self
                .transcript_dir
                .as_ref()
                .map(|p| root.join(p))
                .or_else(super::transcript::default_store),
        }
    }
}

impl ResolvedPaths {
    /// Directory of one batch.
    pub fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.results_dir.join(batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.timeout_seconds, 180);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.progress_interval(), Duration::from_secs(60));
        assert_eq!(config.tiers, Tier::COMPILED.to_vec());
        assert_eq!(config.agent.command, "claude");
        assert_eq!(config.agent.allowed_tools.len(), 6);
        assert_eq!(config.scoring.weights().unwrap(), ScoreWeights::canonical());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            r#"
model: test-model
timeout_seconds: 60
concurrency: 5
progress_interval_seconds: 15
tiers: [pretty, lap-lean, none]
agent:
  allowed_tools: [Read, WebFetch]
  env:
    ANTHROPIC_LOG: debug
scoring:
  preset: balanced
github:
  base_url: https://raw.githubusercontent.com/
  repo: acme/bench
paths:
  results_dir: out/runs
"#,
        )
        .unwrap();

        let config = BenchConfig::load(&path).unwrap();
        assert_eq!(config.model, "test-model");
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.progress_interval(), Duration::from_secs(15));
        assert_eq!(config.tiers, vec![Tier::Pretty, Tier::LapLean, Tier::None]);
        assert_eq!(config.agent.command, "claude");
        assert_eq!(config.agent.env["ANTHROPIC_LOG"], "debug");
        assert_eq!(config.scoring.weights().unwrap(), ScoreWeights::balanced());
        assert_eq!(config.paths.results_dir, PathBuf::from("out/runs"));
        assert_eq!(config.paths.registry, PathBuf::from("registry/registry.yaml"));

        assert_eq!(
            config.doc_url(SpecFormat::OpenApi, "stripe", Tier::LapLean).as_deref(),
            Some("https://raw.githubusercontent.com/acme/bench/main/compiled/openapi/stripe/lean.lap")
        );
        assert_eq!(config.doc_url(SpecFormat::OpenApi, "stripe", Tier::None), None);
    }

    #[test]
    fn test_missing_config_file() {
        let temp = TempDir::new().unwrap();
        let err = BenchConfig::load(&temp.path().join("config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_invalid_weights_rejected_on_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(&path, "scoring:\n  endpoint_weight: 0.9\n").unwrap();
        let err = BenchConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWeights { .. }));
    }

    #[test]
    fn test_explicit_weights_override_preset() {
        let settings = ScoringSettings {
            preset: Some("balanced".to_string()),
            endpoint_weight: Some(0.45),
            param_weight: None,
            code_weight: Some(0.25),
        };
        let weights = settings.weights().unwrap();
        assert_eq!(weights.endpoint_weight, 0.45);
        assert_eq!(weights.param_weight, 0.3);
    }

    #[test]
    fn test_unknown_preset() {
        let settings = ScoringSettings {
            preset: Some("generous".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            settings.weights(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = BenchConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let mut settings = PathSettings::default();
        settings.sandbox_root = Some(PathBuf::from("tmp"));
        settings.transcript_dir = Some(PathBuf::from("transcripts"));

        let resolved = settings.resolve(Path::new("/proj"));
        assert_eq!(resolved.registry, PathBuf::from("/proj/registry/registry.yaml"));
        assert_eq!(resolved.sandbox_root, PathBuf::from("/proj/tmp"));
        assert_eq!(resolved.transcript_dir, Some(PathBuf::from("/proj/transcripts")));
        assert_eq!(resolved.batch_dir("20250101_000000"), PathBuf::from("/proj/results/runs/20250101_000000"));
    }
}
