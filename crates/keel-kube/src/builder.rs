//! Feature builder
//!
//! Configuration calls are recorded as steps and only executed by
//! [`FeatureBuilder::load`]. Binding the installer spec is not an ordinary
//! step: it always runs first, whatever the call order, so every other step
//! can rely on the feature context being populated.

use keel_core::{FeatureContext, InstallerSpec};
use keel_engine::Manifest;
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::error::KubeError;
use crate::feature::{Action, Feature};
use crate::tracker;

type EnabledPredicate = Box<dyn Fn(&Feature) -> bool + Send + Sync>;

/// Error from [`FeatureBuilder::load`]
#[derive(Debug, Error)]
pub enum LoadError {
    /// A configuration step failed; no feature was built
    #[error("feature '{feature}': {step} failed: {source}")]
    Step {
        feature: String,
        step: &'static str,
        #[source]
        source: KubeError,
    },

    /// The feature was built but its resource tracker could not be fetched
    /// or created
    #[error("feature '{}': failed to get or create resource tracker: {source}", .feature.name)]
    Tracker {
        feature: Box<Feature>,
        #[source]
        source: KubeError,
    },
}

impl LoadError {
    /// The partially built feature, when there is one
    pub fn into_feature(self) -> Option<Feature> {
        match self {
            LoadError::Tracker { feature, .. } => Some(*feature),
            LoadError::Step { .. } => None,
        }
    }
}

enum BuildStep {
    Cluster(Arc<dyn ClusterClient>),
    Values(JsonValue),
    ManifestPath(PathBuf),
    Manifest(Manifest),
    Loader(Arc<dyn Action>),
    Precondition(Arc<dyn Action>),
    Resource(Arc<dyn Action>),
    Postcondition(Arc<dyn Action>),
    Cleanup(Arc<dyn Action>),
    EnabledWhen(EnabledPredicate),
}

impl BuildStep {
    fn label(&self) -> &'static str {
        match self {
            BuildStep::Cluster(_) => "bind cluster",
            BuildStep::Values(_) => "merge values",
            BuildStep::ManifestPath(_) => "discover manifests",
            BuildStep::Manifest(_) => "add manifest",
            BuildStep::Loader(_) => "add data loader",
            BuildStep::Precondition(_) => "add precondition",
            BuildStep::Resource(_) => "add resource action",
            BuildStep::Postcondition(_) => "add postcondition",
            BuildStep::Cleanup(_) => "add cleanup",
            BuildStep::EnabledWhen(_) => "evaluate enablement",
        }
    }

    fn run(self, feature: &mut Feature) -> Result<(), KubeError> {
        match self {
            BuildStep::Cluster(cluster) => feature.cluster = Some(cluster),
            BuildStep::Values(values) => {
                feature.context = std::mem::take(&mut feature.context).with_values(&values);
            }
            BuildStep::ManifestPath(path) => {
                let discovered = keel_engine::discover(&path)?;
                debug!(path = %path.display(), count = discovered.len(), "discovered manifests");
                feature.manifests.extend(discovered);
            }
            BuildStep::Manifest(manifest) => feature.manifests.push(manifest),
            BuildStep::Loader(action) => feature.loaders.push(action),
            BuildStep::Precondition(action) => feature.preconditions.push(action),
            BuildStep::Resource(action) => feature.resources.push(action),
            BuildStep::Postcondition(action) => feature.postconditions.push(action),
            BuildStep::Cleanup(action) => feature.cleanups.push(action),
            BuildStep::EnabledWhen(predicate) => feature.enabled = predicate(feature),
        }
        Ok(())
    }
}

/// Start assembling a feature. Never fails; problems surface from `load`.
pub fn create_feature(name: impl Into<String>) -> FeatureBuilder {
    FeatureBuilder {
        name: name.into(),
        spec: None,
        steps: Vec::new(),
    }
}

/// Fluent feature assembly. See the module docs for ordering rules.
pub struct FeatureBuilder {
    name: String,
    spec: Option<InstallerSpec>,
    steps: Vec<BuildStep>,
}

impl fmt::Debug for FeatureBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureBuilder")
            .field("name", &self.name)
            .field("plan", &self.plan())
            .finish()
    }
}

impl FeatureBuilder {
    /// Bind the installer spec the feature operates on
    pub fn for_spec(mut self, spec: InstallerSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.steps.push(BuildStep::Cluster(cluster));
        self
    }

    /// Merge extra values into the context's `values`
    pub fn with_values(mut self, values: JsonValue) -> Self {
        self.steps.push(BuildStep::Values(values));
        self
    }

    /// Register every file under `path` as a manifest
    pub fn manifests(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(BuildStep::ManifestPath(path.into()));
        self
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.steps.push(BuildStep::Manifest(manifest));
        self
    }

    pub fn load_data(mut self, action: Arc<dyn Action>) -> Self {
        self.steps.push(BuildStep::Loader(action));
        self
    }

    pub fn precondition(mut self, action: Arc<dyn Action>) -> Self {
        self.steps.push(BuildStep::Precondition(action));
        self
    }

    /// Imperative resource creation, run after data loading
    pub fn resource(mut self, action: Arc<dyn Action>) -> Self {
        self.steps.push(BuildStep::Resource(action));
        self
    }

    pub fn postcondition(mut self, action: Arc<dyn Action>) -> Self {
        self.steps.push(BuildStep::Postcondition(action));
        self
    }

    /// Register a cleanup action. Cleanups run last registered first.
    pub fn on_delete(mut self, action: Arc<dyn Action>) -> Self {
        self.steps.push(BuildStep::Cleanup(action));
        self
    }

    /// Decide enablement from the feature as built so far
    pub fn enabled_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Feature) -> bool + Send + Sync + 'static,
    {
        self.steps.push(BuildStep::EnabledWhen(Box::new(predicate)));
        self
    }

    /// Labels of the steps `load` will execute, in execution order
    pub fn plan(&self) -> Vec<&'static str> {
        std::iter::once("bind spec")
            .chain(self.steps.iter().map(BuildStep::label))
            .collect()
    }

    /// Execute the recorded steps and seal the feature.
    ///
    /// An enabled feature also gets its resource tracker, fetched or created
    /// on the bound cluster. A tracker failure still hands back the feature
    /// through [`LoadError::into_feature`].
    pub async fn load(self) -> Result<Feature, LoadError> {
        let FeatureBuilder { name, spec, steps } = self;
        let mut feature = Feature::new(name);

        let step_error = |feature: &Feature, step: &'static str, source: KubeError| LoadError::Step {
            feature: feature.name.clone(),
            step,
            source,
        };

        if keel_core::to_rfc1123_subdomain(&feature.name).is_empty() {
            return Err(step_error(
                &feature,
                "bind spec",
                KubeError::InvalidConfig(format!(
                    "feature name '{}' has no characters usable in a resource name",
                    feature.name
                )),
            ));
        }

        let Some(spec) = spec else {
            return Err(step_error(
                &feature,
                "bind spec",
                KubeError::InvalidConfig("no installer spec bound".to_string()),
            ));
        };
        if let Err(e) = spec.validate() {
            return Err(step_error(&feature, "bind spec", e.into()));
        }
        feature.context = FeatureContext::from_spec(&spec);
        feature.spec = spec;

        for step in steps {
            let label = step.label();
            if let Err(e) = step.run(&mut feature) {
                return Err(step_error(&feature, label, e));
            }
        }

        if !feature.enabled {
            debug!(feature = %feature.name, "feature disabled");
            return Ok(feature);
        }

        let tracker_result = match &feature.cluster {
            Some(cluster) => {
                tracker::get_or_create(
                    cluster.as_ref(),
                    &feature.spec.applications_namespace,
                    &feature.name,
                )
                .await
            }
            None => Err(KubeError::NoCluster(feature.name.clone())),
        };

        match tracker_result {
            Ok(tracker) => {
                feature.tracker = Some(tracker);
                Ok(feature)
            }
            Err(source) => {
                warn!(feature = %feature.name, error = %source, "resource tracker unavailable");
                Err(LoadError::Tracker {
                    feature: Box::new(feature),
                    source,
                })
            }
        }
    }
}
