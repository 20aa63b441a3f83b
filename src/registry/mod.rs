//! Spec registry and task manifests.
//!
//! This module provides read-only access to:
//! - The registry of API specs under evaluation (format, size class, source)
//! - Per-spec task manifests holding the expected operations and parameters
//! - The closed sets of formats, size classes and documentation tiers

pub mod format;
pub mod tasks;

pub use format::{SizeClass, SpecFormat, Tier};
pub use tasks::{load_task_catalog, load_task_manifest, TaskCatalog, TaskDef, TaskManifest};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Registry metadata for one spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecMeta {
    /// Source format of the spec.
    pub format: SpecFormat,
    /// Size classification used for dispatch ordering.
    #[serde(default)]
    pub size_class: SizeClass,
    /// Location of the original source document.
    #[serde(default)]
    pub source_file: Option<String>,
}

impl SpecMeta {
    pub fn new(format: SpecFormat, size_class: SizeClass) -> Self {
        Self {
            format,
            size_class,
            source_file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    specs: BTreeMap<String, SpecMeta>,
}

/// The spec registry, loaded once at startup and passed by reference.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    specs: BTreeMap<String, SpecMeta>,
}

impl Registry {
    /// Builds a registry from already-parsed entries.
    pub fn from_specs(specs: impl IntoIterator<Item = (String, SpecMeta)>) -> Self {
        Self {
            specs: specs.into_iter().collect(),
        }
    }

    /// Loads a `registry.yaml` file (`specs: {<id>: {format, size_class, ...}}`).
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RegistryFile =
            serde_yaml::from_str(&content).map_err(|source| RegistryError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { specs: file.specs })
    }

    pub fn get(&self, spec_id: &str) -> Option<&SpecMeta> {
        self.specs.get(spec_id)
    }

    /// Like [`Registry::get`] but unknown ids are an error.
    pub fn require(&self, spec_id: &str) -> Result<&SpecMeta, RegistryError> {
        self.get(spec_id)
            .ok_or_else(|| RegistryError::UnknownSpec(spec_id.to_string()))
    }

    /// Iterates specs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SpecMeta)> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_registry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("registry.yaml");
        fs::write(
            &path,
            r#"
specs:
  stripe:
    format: openapi
    size_class: large
    source_file: sources/stripe.yaml
  streetlights:
    format: asyncapi
"#,
        )
        .unwrap();

        let registry = Registry::load(&path).unwrap();
        assert_eq!(registry.len(), 2);

        let stripe = registry.get("stripe").unwrap();
        assert_eq!(stripe.format, SpecFormat::OpenApi);
        assert_eq!(stripe.size_class, SizeClass::Large);

        let streetlights = registry.get("streetlights").unwrap();
        assert_eq!(streetlights.size_class, SizeClass::Small);
        assert!(streetlights.source_file.is_none());
    }

    #[test]
    fn test_missing_registry_is_error() {
        let temp = TempDir::new().unwrap();
        let err = Registry::load(&temp.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_require_unknown_spec() {
        let registry = Registry::default();
        assert!(matches!(
            registry.require("stripe"),
            Err(RegistryError::UnknownSpec(_))
        ));
    }
}
