//! Heuristic scoring of agent output against expected operations.
//!
//! A run's free-text output is scored on three axes, each in `[0, 1]`:
//! - Endpoint identification ([`endpoint`])
//! - Parameter accuracy inside fenced blocks ([`params`])
//! - Code quality of language-tagged blocks ([`code_quality`])
//!
//! The total is the weighted sum of the three under [`ScoreWeights`].

pub mod code_quality;
pub mod endpoint;
pub mod extract;
pub mod normalize;
pub mod params;

pub use code_quality::{score_code_quality, CodeQuality};
pub use endpoint::score_endpoints;
pub use extract::{code_blocks, extract_operations, structured_sections};
pub use normalize::normalize_operation;
pub use params::score_params;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const WEIGHT_EPSILON: f64 = 1e-6;

/// Weights of the three subscores. They must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(alias = "endpoint")]
    pub endpoint_weight: f64,
    #[serde(alias = "param")]
    pub param_weight: f64,
    #[serde(alias = "code")]
    pub code_weight: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ScoreWeights {
    /// Validated constructor.
    pub fn new(endpoint: f64, param: f64, code: f64) -> Result<Self, ConfigError> {
        let weights = Self {
            endpoint_weight: endpoint,
            param_weight: param,
            code_weight: code,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Endpoint-heavy weighting: 0.6 / 0.3 / 0.1.
    pub fn canonical() -> Self {
        Self {
            endpoint_weight: 0.6,
            param_weight: 0.3,
            code_weight: 0.1,
        }
    }

    /// Weighting that gives code evidence as much say as endpoints:
    /// 0.35 / 0.30 / 0.35.
    pub fn balanced() -> Self {
        Self {
            endpoint_weight: 0.35,
            param_weight: 0.3,
            code_weight: 0.35,
        }
    }

    /// Looks up a named preset (`canonical`, `default` or `balanced`).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "canonical" | "default" => Some(Self::canonical()),
            "balanced" => Some(Self::balanced()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.endpoint_weight, self.param_weight, self.code_weight];
        let in_range = all.iter().all(|w| w.is_finite() && (0.0..=1.0).contains(w));
        let sum: f64 = all.iter().sum();
        if !in_range || (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(ConfigError::InvalidWeights {
                endpoint: self.endpoint_weight,
                param: self.param_weight,
                code: self.code_weight,
            });
        }
        Ok(())
    }

    /// Weighted sum of three subscores, each clamped to `[0, 1]`.
    pub fn combine(&self, endpoint: f64, params: f64, code: f64) -> f64 {
        let total = self.endpoint_weight * endpoint.clamp(0.0, 1.0)
            + self.param_weight * params.clamp(0.0, 1.0)
            + self.code_weight * code.clamp(0.0, 1.0);
        total.clamp(0.0, 1.0)
    }
}

/// Score of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub total: f64,
    pub endpoint: f64,
    pub params: f64,
    pub code: f64,
    #[serde(default)]
    pub code_detail: CodeQuality,
    /// Operations extracted from the output, kept for auditing.
    #[serde(default, alias = "found_endpoints")]
    pub found_operations: Vec<String>,
}

impl ScoreRecord {
    /// The score given to runs that produced nothing to score.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Scores one agent output.
pub fn score_run(
    output: &str,
    target_operations: &[String],
    expected_params: &BTreeMap<String, Vec<String>>,
    weights: &ScoreWeights,
) -> ScoreRecord {
    let found_operations = extract_operations(output);
    let endpoint = score_endpoints(&found_operations, target_operations, output).clamp(0.0, 1.0);
    let params = score_params(output, expected_params).clamp(0.0, 1.0);
    let code_detail = score_code_quality(output, target_operations, expected_params);
    let code = code_detail.total.clamp(0.0, 1.0);

    ScoreRecord {
        total: weights.combine(endpoint, params, code),
        endpoint,
        params,
        code,
        code_detail,
        found_operations,
    }
}
