//! Run manifest construction.
//!
//! Expands the registry's specs, their tasks and the configured tiers into
//! an ordered list of run descriptors. Large specs come first so that the
//! slowest runs start early.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::registry::{Registry, SizeClass, SpecFormat, TaskCatalog, Tier};

/// Number of hex characters kept from the run id digest.
const RUN_ID_LEN: usize = 12;

/// Pilot mode keeps this many specs per size class.
const PILOT_PER_SIZE_CLASS: usize = 2;
/// Pilot mode never selects more specs than this.
const PILOT_MAX_SPECS: usize = 6;

/// Deterministic run identifier for `(spec, tier, task)`.
pub fn run_id(spec_id: &str, tier: Tier, task_id: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}:{}", spec_id, tier, task_id).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(RUN_ID_LEN);
    id
}

/// Where a run's documentation comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocArtifact {
    /// Compiled document on disk. `None` for the no-documentation tier.
    pub path: Option<PathBuf>,
    /// Remote location of the same document, when hosted.
    pub url: Option<String>,
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunDescriptor {
    pub run_id: String,
    pub spec_id: String,
    pub format: SpecFormat,
    pub tier: Tier,
    pub task_id: String,
    pub task_description: String,
    pub target_operations: Vec<String>,
    pub expected_params: BTreeMap<String, Vec<String>>,
    pub doc: DocArtifact,
    pub size_class: SizeClass,
}

impl RunDescriptor {
    /// `spec:tier:task` label used in progress output.
    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.spec_id, self.tier, self.task_id)
    }
}

/// Narrows the manifest. Stored with a batch so `resume` rebuilds the same
/// manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFilter {
    #[serde(default)]
    pub spec: Option<String>,
    #[serde(default)]
    pub format: Option<SpecFormat>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub pilot: bool,
}

/// Locates the documentation artifact of a `(spec, tier)`.
pub trait ArtifactResolver: Send + Sync {
    /// Path of the compiled document, `None` when it was never compiled.
    fn resolve(&self, spec_id: &str, format: SpecFormat, tier: Tier) -> Option<PathBuf>;

    /// Remote URL of the document, if hosted.
    fn remote_url(&self, _spec_id: &str, _format: SpecFormat, _tier: Tier) -> Option<String> {
        None
    }
}

/// Compiled documents laid out as `<root>/<format>/<spec_id>/<file>`.
pub struct CompiledLayout {
    root: PathBuf,
    url_for: Option<Box<dyn Fn(SpecFormat, &str, Tier) -> Option<String> + Send + Sync>>,
}

impl CompiledLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_for: None,
        }
    }

    /// Attaches a remote URL builder.
    pub fn with_remote<F>(mut self, url_for: F) -> Self
    where
        F: Fn(SpecFormat, &str, Tier) -> Option<String> + Send + Sync + 'static,
    {
        self.url_for = Some(Box::new(url_for));
        self
    }

    /// Where the artifact would live, whether or not it exists.
    pub fn artifact_path(&self, spec_id: &str, format: SpecFormat, tier: Tier) -> Option<PathBuf> {
        let file = tier.artifact_filename(format)?;
        Some(self.root.join(format.as_str()).join(spec_id).join(file))
    }
}

impl ArtifactResolver for CompiledLayout {
    fn resolve(&self, spec_id: &str, format: SpecFormat, tier: Tier) -> Option<PathBuf> {
        self.artifact_path(spec_id, format, tier)
            .filter(|path| path.is_file())
    }

    fn remote_url(&self, spec_id: &str, format: SpecFormat, tier: Tier) -> Option<String> {
        self.url_for.as_ref().and_then(|f| f(format, spec_id, tier))
    }
}

/// Picks the pilot subset from size-sorted specs.
fn pilot_subset<'a, T>(sorted: Vec<(&'a String, &'a T, SizeClass)>) -> Vec<(&'a String, &'a T, SizeClass)> {
    let mut picked = Vec::new();
    for class in [SizeClass::Large, SizeClass::Medium, SizeClass::Small] {
        picked.extend(
            sorted
                .iter()
                .filter(|(_, _, size)| *size == class)
                .take(PILOT_PER_SIZE_CLASS)
                .cloned(),
        );
    }
    picked.truncate(PILOT_MAX_SPECS);
    picked
}

/// Builds the ordered run manifest.
///
/// Specs without a task manifest are skipped, as are `(spec, tier)` pairs
/// whose artifact cannot be resolved. The no-documentation tier never needs
/// an artifact.
pub fn build_run_manifest(
    registry: &Registry,
    catalog: &TaskCatalog,
    resolver: &dyn ArtifactResolver,
    tiers: &[Tier],
    filter: &ManifestFilter,
) -> Vec<RunDescriptor> {
    let tiers: Vec<Tier> = tiers
        .iter()
        .copied()
        .filter(|t| filter.tier.map_or(true, |want| want == *t))
        .collect();

    let mut specs: Vec<_> = registry
        .iter()
        .filter(|(id, _)| filter.spec.as_ref().map_or(true, |want| want == *id))
        .filter(|(_, meta)| filter.format.map_or(true, |want| want == meta.format))
        .map(|(id, meta)| (id, meta, meta.size_class))
        .collect();
    // Stable: ties keep registry (id) order.
    specs.sort_by_key(|(_, _, size)| size.rank());

    if filter.pilot {
        specs = pilot_subset(specs);
    }

    let mut runs = Vec::new();
    for (spec_id, meta, size_class) in specs {
        let Some(manifest) = catalog.get(spec_id) else {
            debug!("Skipping {}: no task manifest", spec_id);
            continue;
        };

        let tasks = manifest
            .tasks
            .iter()
            .filter(|t| filter.task.as_ref().map_or(true, |want| *want == t.id));

        for task in tasks {
            for &tier in &tiers {
                let doc = if tier.has_document() {
                    let Some(path) = resolver.resolve(spec_id, meta.format, tier) else {
                        debug!("Skipping {}:{}: artifact not compiled", spec_id, tier);
                        continue;
                    };
                    DocArtifact {
                        path: Some(path),
                        url: resolver.remote_url(spec_id, meta.format, tier),
                    }
                } else {
                    DocArtifact::default()
                };

                runs.push(RunDescriptor {
                    run_id: run_id(spec_id, tier, &task.id),
                    spec_id: spec_id.clone(),
                    format: meta.format,
                    tier,
                    task_id: task.id.clone(),
                    task_description: task.description.clone(),
                    target_operations: task.target_endpoints.clone(),
                    expected_params: task.expected_params.clone(),
                    doc,
                    size_class,
                });
            }
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{SpecMeta, TaskDef, TaskManifest};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    /// Resolves every artifact except the ones listed.
    struct FakeResolver {
        missing: HashSet<(String, Tier)>,
    }

    impl ArtifactResolver for FakeResolver {
        fn resolve(&self, spec_id: &str, format: SpecFormat, tier: Tier) -> Option<PathBuf> {
            if self.missing.contains(&(spec_id.to_string(), tier)) {
                return None;
            }
            tier.artifact_filename(format)
                .map(|f| PathBuf::from(format!("/compiled/{}/{}", spec_id, f)))
        }
    }

    fn all_present() -> FakeResolver {
        FakeResolver {
            missing: HashSet::new(),
        }
    }

    fn task(id: &str) -> TaskDef {
        TaskDef {
            id: id.to_string(),
            description: format!("Task {}", id),
            target_endpoints: vec!["GET /things".to_string()],
            expected_params: BTreeMap::new(),
        }
    }

    fn fixture(specs: &[(&str, SizeClass)]) -> (Registry, TaskCatalog) {
        let registry = Registry::from_specs(
            specs
                .iter()
                .map(|(id, size)| (id.to_string(), SpecMeta::new(SpecFormat::OpenApi, *size))),
        );
        let catalog = specs
            .iter()
            .map(|(id, _)| {
                (
                    id.to_string(),
                    TaskManifest {
                        tasks: vec![task("t1"), task("t2")],
                    },
                )
            })
            .collect();
        (registry, catalog)
    }

    #[test]
    fn test_run_id_is_deterministic() {
        let a = run_id("stripe", Tier::LapLean, "t1");
        assert_eq!(a, run_id("stripe", Tier::LapLean, "t1"));
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, run_id("stripe", Tier::LapStandard, "t1"));
        assert_ne!(a, run_id("stripe", Tier::LapLean, "t2"));
    }

    #[test]
    fn test_large_specs_first() {
        let (registry, catalog) = fixture(&[
            ("alpha", SizeClass::Small),
            ("beta", SizeClass::Large),
            ("gamma", SizeClass::Medium),
        ]);
        let runs = build_run_manifest(
            &registry,
            &catalog,
            &all_present(),
            &[Tier::Pretty],
            &ManifestFilter::default(),
        );
        let order: Vec<&str> = runs.iter().map(|r| r.spec_id.as_str()).collect();
        assert_eq!(order, vec!["beta", "beta", "gamma", "gamma", "alpha", "alpha"]);
    }

    #[test]
    fn test_cross_product_and_run_ids() {
        let (registry, catalog) = fixture(&[("stripe", SizeClass::Large)]);
        let runs = build_run_manifest(
            &registry,
            &catalog,
            &all_present(),
            &Tier::COMPILED,
            &ManifestFilter::default(),
        );
        assert_eq!(runs.len(), 8);
        for run in &runs {
            assert_eq!(run.run_id, run_id(&run.spec_id, run.tier, &run.task_id));
            assert!(run.doc.path.is_some());
        }
    }

    #[test]
    fn test_uncompiled_tier_is_skipped() {
        let (registry, catalog) = fixture(&[("stripe", SizeClass::Large)]);
        let resolver = FakeResolver {
            missing: HashSet::from([("stripe".to_string(), Tier::LapLean)]),
        };
        let runs = build_run_manifest(
            &registry,
            &catalog,
            &resolver,
            &[Tier::Pretty, Tier::LapLean],
            &ManifestFilter::default(),
        );
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.tier == Tier::Pretty));
    }

    #[test]
    fn test_none_tier_bypasses_resolution() {
        let (registry, catalog) = fixture(&[("stripe", SizeClass::Large)]);
        let resolver = FakeResolver {
            missing: HashSet::from([("stripe".to_string(), Tier::None)]),
        };
        let runs = build_run_manifest(
            &registry,
            &catalog,
            &resolver,
            &[Tier::None],
            &ManifestFilter::default(),
        );
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].doc, DocArtifact::default());
    }

    #[test]
    fn test_filters() {
        let (registry, catalog) = fixture(&[
            ("stripe", SizeClass::Large),
            ("twilio", SizeClass::Large),
        ]);
        let filter = ManifestFilter {
            spec: Some("twilio".to_string()),
            tier: Some(Tier::Minified),
            task: Some("t2".to_string()),
            ..Default::default()
        };
        let runs = build_run_manifest(&registry, &catalog, &all_present(), &Tier::COMPILED, &filter);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].label(), "twilio:minified:t2");

        let filter = ManifestFilter {
            format: Some(SpecFormat::GraphQl),
            ..Default::default()
        };
        assert!(build_run_manifest(&registry, &catalog, &all_present(), &Tier::COMPILED, &filter).is_empty());
    }

    #[test]
    fn test_pilot_subset() {
        let (registry, catalog) = fixture(&[
            ("l1", SizeClass::Large),
            ("l2", SizeClass::Large),
            ("l3", SizeClass::Large),
            ("m1", SizeClass::Medium),
            ("s1", SizeClass::Small),
            ("s2", SizeClass::Small),
            ("s3", SizeClass::Small),
        ]);
        let filter = ManifestFilter {
            pilot: true,
            task: Some("t1".to_string()),
            ..Default::default()
        };
        let runs = build_run_manifest(&registry, &catalog, &all_present(), &[Tier::Pretty], &filter);
        let specs: Vec<&str> = runs.iter().map(|r| r.spec_id.as_str()).collect();
        assert_eq!(specs, vec!["l1", "l2", "m1", "s1", "s2"]);
    }

    #[test]
    fn test_spec_without_manifest_is_skipped() {
        let (registry, mut catalog) = fixture(&[("stripe", SizeClass::Large)]);
        catalog.clear();
        let runs = build_run_manifest(
            &registry,
            &catalog,
            &all_present(),
            &Tier::COMPILED,
            &ManifestFilter::default(),
        );
        assert!(runs.is_empty());
    }

    #[test]
    fn test_compiled_layout() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("asyncapi").join("streetlights");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("pretty.yaml"), "asyncapi: 2.0.0").unwrap();

        let layout = CompiledLayout::new(temp.path())
            .with_remote(|format, spec, tier| Some(format!("https://host/{}/{}/{}", format, spec, tier)));
        assert_eq!(
            layout.resolve("streetlights", SpecFormat::AsyncApi, Tier::Pretty),
            Some(dir.join("pretty.yaml"))
        );
        assert_eq!(layout.resolve("streetlights", SpecFormat::AsyncApi, Tier::LapLean), None);
        assert_eq!(layout.resolve("streetlights", SpecFormat::AsyncApi, Tier::None), None);
        assert_eq!(
            layout.remote_url("streetlights", SpecFormat::AsyncApi, Tier::Pretty).as_deref(),
            Some("https://host/asyncapi/streetlights/pretty")
        );
    }

    #[test]
    fn test_filter_serde() {
        let filter = ManifestFilter {
            spec: Some("stripe".to_string()),
            tier: Some(Tier::LapStandard),
            pilot: true,
            ..Default::default()
        };
        let json = serde_json::to_string(&filter).unwrap();
        assert!(json.contains("\"lap-standard\""));
        let back: ManifestFilter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
        let empty: ManifestFilter = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, ManifestFilter::default());
    }
}
