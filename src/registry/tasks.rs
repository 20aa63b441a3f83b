//! Per-spec task manifests: the ground truth each run is scored against.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::format::SpecFormat;
use super::Registry;
use crate::error::RegistryError;

/// One integration task for a spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDef {
    /// Task identifier, unique within its spec (e.g. `t1`).
    pub id: String,
    /// What the agent is asked to do.
    pub description: String,
    /// Expected `VERB path-or-channel` operations.
    #[serde(default, alias = "target_operations")]
    pub target_endpoints: Vec<String>,
    /// Expected parameter names per target operation.
    #[serde(default)]
    pub expected_params: BTreeMap<String, Vec<String>>,
}

/// The task list of a single spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskManifest {
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
}

impl TaskManifest {
    /// Looks up a task by id.
    pub fn task(&self, task_id: &str) -> Option<&TaskDef> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

/// Task manifests keyed by spec id.
pub type TaskCatalog = BTreeMap<String, TaskManifest>;

/// Path of the manifest for a spec: `<dir>/<format>/<spec_id>.yaml`.
pub fn manifest_path(manifests_dir: &Path, spec_id: &str, format: SpecFormat) -> PathBuf {
    manifests_dir
        .join(format.as_str())
        .join(format!("{}.yaml", spec_id))
}

/// Loads one task manifest. A missing file yields `Ok(None)`.
pub fn load_task_manifest(
    manifests_dir: &Path,
    spec_id: &str,
    format: SpecFormat,
) -> Result<Option<TaskManifest>, RegistryError> {
    let path = manifest_path(manifests_dir, spec_id, format);
    if !path.exists() {
        debug!("No task manifest for {} at {}", spec_id, path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(&path).map_err(|source| RegistryError::Io {
        path: path.clone(),
        source,
    })?;
    let manifest = serde_yaml::from_str(&content)
        .map_err(|source| RegistryError::Yaml { path, source })?;
    Ok(Some(manifest))
}

/// Loads the manifests of every spec in the registry. Specs without a
/// manifest are left out of the catalog.
pub fn load_task_catalog(
    registry: &Registry,
    manifests_dir: &Path,
) -> Result<TaskCatalog, RegistryError> {
    let mut catalog = TaskCatalog::new();
    for (spec_id, meta) in registry.iter() {
        if let Some(manifest) = load_task_manifest(manifests_dir, spec_id, meta.format)? {
            catalog.insert(spec_id.clone(), manifest);
        }
    }
    Ok(catalog)
}
