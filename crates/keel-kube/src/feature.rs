//! Feature: a named unit of cluster configuration with its own apply and
//! cleanup pipelines
//!
//! Apply runs these stages in order and stops at the first failing stage:
//!
//! 1. preconditions (all run, errors aggregated)
//! 2. data loaders (all run, errors aggregated)
//! 3. resource actions (first failure aborts)
//! 4. manifests, rendered then applied (first failure aborts)
//! 5. postconditions (all run, errors aggregated)
//!
//! Cleanup runs every registered cleanup action, last registered first, then
//! deletes the feature's resource tracker. Nothing aborts cleanup; all errors
//! are reported together.

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use keel_core::{FeatureContext, InstallerSpec};
use keel_engine::{Engine, Manifest};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::cluster::ClusterClient;
use crate::error::{ErrorList, FeatureError, KubeError, Result};
use crate::resources::{AppliedResource, apply_manifest};
use crate::tracker::{self, FeatureTracker, FeatureTrackerStatus};

/// Future returned by closure-based actions
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A step run against a feature: a check, a data loader, a resource action or
/// a cleanup
#[async_trait]
pub trait Action: Send + Sync {
    /// Short description used in logs and error messages
    fn name(&self) -> &str;

    async fn run(&self, feature: &mut Feature) -> Result<()>;
}

/// Action backed by a closure
pub struct FnAction<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a mut Feature) -> ActionFuture<'a> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        (self.f)(feature).await
    }
}

/// Wrap a closure as an action
///
/// ```ignore
/// let check = action_fn("domain set", |feature| {
///     Box::pin(async move {
///         if feature.context.domain.is_empty() {
///             return Err(KubeError::ConditionNotMet("no domain".into()));
///         }
///         Ok(())
///     })
/// });
/// ```
pub fn action_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn Action>
where
    F: for<'a> Fn(&'a mut Feature) -> ActionFuture<'a> + Send + Sync + 'static,
{
    Arc::new(FnAction {
        name: name.into(),
        f,
    })
}

/// Stage a feature's apply reached, recorded on its tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeaturePhase {
    FeatureCreated,
    PreConditions,
    LoadTemplateData,
    ResourceCreation,
    ApplyManifests,
    PostConditions,
}

impl FeaturePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FeatureCreated => "FeatureCreated",
            Self::PreConditions => "PreConditions",
            Self::LoadTemplateData => "LoadTemplateData",
            Self::ResourceCreation => "ResourceCreation",
            Self::ApplyManifests => "ApplyManifests",
            Self::PostConditions => "PostConditions",
        }
    }
}

impl fmt::Display for FeaturePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded feature. Built by [`crate::builder::FeatureBuilder`].
pub struct Feature {
    pub name: String,
    /// When false, apply and cleanup do nothing
    pub enabled: bool,
    pub spec: InstallerSpec,
    /// Template scope; data loaders write into it
    pub context: FeatureContext,
    pub manifests: Vec<Manifest>,
    pub tracker: Option<FeatureTracker>,
    pub(crate) cluster: Option<Arc<dyn ClusterClient>>,
    pub(crate) engine: Engine,
    pub(crate) preconditions: Vec<Arc<dyn Action>>,
    pub(crate) loaders: Vec<Arc<dyn Action>>,
    pub(crate) resources: Vec<Arc<dyn Action>>,
    pub(crate) postconditions: Vec<Arc<dyn Action>>,
    pub(crate) cleanups: Vec<Arc<dyn Action>>,
    phase: FeaturePhase,
    applied: Vec<AppliedResource>,
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |actions: &[Arc<dyn Action>]| -> Vec<String> {
            actions.iter().map(|a| a.name().to_string()).collect()
        };
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("manifests", &self.manifests.iter().map(|m| &m.name).collect::<Vec<_>>())
            .field("preconditions", &names(&self.preconditions))
            .field("loaders", &names(&self.loaders))
            .field("resources", &names(&self.resources))
            .field("postconditions", &names(&self.postconditions))
            .field("cleanups", &names(&self.cleanups))
            .field("tracker", &self.tracker.as_ref().and_then(|t| t.metadata.name.clone()))
            .field("has_cluster", &self.cluster.is_some())
            .finish()
    }
}

impl Feature {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            enabled: true,
            spec: InstallerSpec::default(),
            context: FeatureContext::default(),
            manifests: Vec::new(),
            tracker: None,
            cluster: None,
            engine: Engine::default(),
            preconditions: Vec::new(),
            loaders: Vec::new(),
            resources: Vec::new(),
            postconditions: Vec::new(),
            cleanups: Vec::new(),
            phase: FeaturePhase::FeatureCreated,
            applied: Vec::new(),
        }
    }

    /// Cluster client bound to this feature
    pub fn cluster(&self) -> Result<Arc<dyn ClusterClient>> {
        self.cluster
            .clone()
            .ok_or_else(|| KubeError::NoCluster(self.name.clone()))
    }

    /// Name of this feature's resource tracker
    pub fn tracker_name(&self) -> String {
        keel_core::tracker_name(&self.spec.applications_namespace, &self.name)
    }

    /// Owner reference every created object should carry
    pub fn owner_reference(&self) -> Result<OwnerReference> {
        let tracker = self
            .tracker
            .as_ref()
            .ok_or_else(|| KubeError::NoTracker(self.name.clone()))?;
        tracker::owner_reference(tracker)
    }

    /// Render a string against the feature context. Strings without template
    /// markers are returned unchanged.
    pub fn render_value(&self, value: &str) -> Result<String> {
        if !value.contains("{{") && !value.contains("{%") {
            return Ok(value.to_string());
        }
        Ok(self
            .engine
            .render_string(value, &self.context, &format!("{}:value", self.name))?)
    }

    /// Phase the last apply reached
    pub fn phase(&self) -> FeaturePhase {
        self.phase
    }

    /// Objects the manifests touched during the last apply
    pub fn applied_resources(&self) -> &[AppliedResource] {
        &self.applied
    }

    /// Run the apply pipeline
    pub async fn apply(&mut self) -> std::result::Result<(), FeatureError> {
        let span = info_span!("feature", name = %self.name);
        async {
            if !self.enabled {
                info!("feature disabled, skipping apply");
                return Ok(());
            }

            info!("applying feature");
            let result = self.run_pipeline().await;
            self.report_status(&result).await;
            match &result {
                Ok(()) => info!("feature applied"),
                Err(e) => warn!(phase = %self.phase, error = %e, "feature apply failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_pipeline(&mut self) -> std::result::Result<(), FeatureError> {
        self.applied.clear();

        self.phase = FeaturePhase::PreConditions;
        let actions = self.preconditions.clone();
        self.run_all(&actions)
            .await
            .map_err(|errors| FeatureError::Precondition {
                feature: self.name.clone(),
                errors,
            })?;

        self.phase = FeaturePhase::LoadTemplateData;
        let actions = self.loaders.clone();
        self.run_all(&actions)
            .await
            .map_err(|errors| FeatureError::DataLoading {
                feature: self.name.clone(),
                errors,
            })?;

        self.phase = FeaturePhase::ResourceCreation;
        let actions = self.resources.clone();
        for action in &actions {
            debug!(action = action.name(), "running resource action");
            action
                .run(self)
                .await
                .map_err(|source| FeatureError::ResourceCreation {
                    feature: self.name.clone(),
                    action: action.name().to_string(),
                    source,
                })?;
        }

        self.phase = FeaturePhase::ApplyManifests;
        self.apply_manifests().await?;

        self.phase = FeaturePhase::PostConditions;
        let actions = self.postconditions.clone();
        self.run_all(&actions)
            .await
            .map_err(|errors| FeatureError::Postcondition {
                feature: self.name.clone(),
                errors,
            })?;

        Ok(())
    }

    /// Run every action, collecting failures instead of stopping
    async fn run_all(&mut self, actions: &[Arc<dyn Action>]) -> std::result::Result<(), ErrorList> {
        let mut errors = ErrorList::default();
        for action in actions {
            debug!(action = action.name(), phase = %self.phase, "running action");
            if let Err(e) = action.run(self).await {
                warn!(action = action.name(), phase = %self.phase, error = %e, "action failed");
                errors.push(action.name(), e);
            }
        }
        errors.into_result()
    }

    async fn apply_manifests(&mut self) -> std::result::Result<(), FeatureError> {
        if self.manifests.is_empty() {
            return Ok(());
        }

        let feature = self.name.clone();
        let manifest_error = |manifest: &Manifest, source: KubeError| FeatureError::Manifest {
            feature: feature.clone(),
            manifest: manifest.name.clone(),
            path: manifest.origin(),
            source,
        };

        let prepared = self.cluster().and_then(|cluster| Ok((cluster, self.owner_reference()?)));
        let (cluster, owner) = match prepared {
            Ok(prepared) => prepared,
            Err(source) => return Err(manifest_error(&self.manifests[0], source)),
        };

        let engine = self.engine.clone();
        let context = self.context.clone();
        for manifest in self.manifests.iter_mut() {
            let rendered = match manifest.render(&engine, &context) {
                Ok(content) => content.to_string(),
                Err(e) => return Err(manifest_error(manifest, e.into())),
            };

            debug!(manifest = %manifest.name, patch = manifest.is_patch, "applying manifest");
            match apply_manifest(cluster.as_ref(), &rendered, manifest.is_patch, &owner).await {
                Ok(applied) => self.applied.extend(applied),
                Err(e) => return Err(manifest_error(manifest, e)),
            }
        }
        Ok(())
    }

    /// Record the outcome on the tracker. Failures here are only logged.
    async fn report_status(&self, result: &std::result::Result<(), FeatureError>) {
        let (Some(cluster), Some(_)) = (&self.cluster, &self.tracker) else {
            return;
        };

        let status = match result {
            Ok(()) => FeatureTrackerStatus::available(FeaturePhase::FeatureCreated.as_str()),
            Err(e) => FeatureTrackerStatus::degraded(self.phase.as_str(), e.to_string()),
        };
        if let Err(e) = tracker::update_status(cluster.as_ref(), &self.tracker_name(), &status).await {
            warn!(error = %e, "failed to update resource tracker status");
        }
    }

    /// Run the cleanup pipeline
    pub async fn cleanup(&mut self) -> std::result::Result<(), FeatureError> {
        let span = info_span!("feature", name = %self.name);
        async {
            if !self.enabled {
                info!("feature disabled, skipping cleanup");
                return Ok(());
            }

            info!("cleaning up feature");
            let mut errors = ErrorList::default();

            let actions = self.cleanups.clone();
            for action in actions.iter().rev() {
                debug!(action = action.name(), "running cleanup action");
                if let Err(e) = action.run(self).await {
                    warn!(action = action.name(), error = %e, "cleanup action failed");
                    errors.push(action.name(), e);
                }
            }

            // the tracker owns everything above, so it goes last
            if let (Some(cluster), Some(_)) = (&self.cluster, &self.tracker) {
                let name = self.tracker_name();
                match tracker::delete(cluster.as_ref(), &name).await {
                    Ok(()) => self.tracker = None,
                    Err(e) => errors.push(format!("delete tracker {}", name), e),
                }
            }

            errors.into_result().map_err(|errors| FeatureError::Cleanup {
                feature: self.name.clone(),
                errors,
            })
        }
        .instrument(span)
        .await
    }
}
