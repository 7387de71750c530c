//! Declarative feature set files
//!
//! A feature set file lists features in apply order. Each entry names its
//! manifests (paths relative to the file) and its actions:
//!
//! ```yaml
//! features:
//!   - name: mesh-control-plane-creation
//!     enabledWhen: mesh-managed
//!     manifests: [servicemesh/base]
//!     preconditions:
//!       - type: ensureNamespace
//!         name: "{{ mesh.namespace }}"
//!     postconditions:
//!       - type: waitForPods
//!         namespace: "{{ mesh.namespace }}"
//! ```

use keel_core::{InstallationMode, InstallerSpec};
use keel_kube::actions::{
    AnnotateNamespaces, ClusterDomain, CreateConfigMap, DeleteResource, EnsureCrdInstalled,
    EnsureNamespace, OAuthConfig, PatchFirstOfKind, SelfSignedCertificate, WaitForControlPlane,
    WaitForPods, WaitForResource,
};
use keel_kube::{Action, ClusterClient, FeatureBuilder, FeatureSet, LoadError, create_feature};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CliError, Result};

/// Contents of a feature set file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSetFile {
    pub features: Vec<FeatureDef>,

    /// Directory manifest paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// When a feature takes part in apply and cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnabledWhen {
    #[default]
    Always,
    /// The service mesh is in the Managed state
    MeshManaged,
    /// The mesh is managed and its control plane is installed by keel
    MinimalMesh,
}

impl EnabledWhen {
    pub fn holds(&self, spec: &InstallerSpec) -> bool {
        match self {
            EnabledWhen::Always => true,
            EnabledWhen::MeshManaged => spec.service_mesh.is_managed(),
            EnabledWhen::MinimalMesh => {
                spec.service_mesh.is_managed()
                    && spec.service_mesh.mesh.installation_mode == InstallationMode::Minimal
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDef {
    pub name: String,
    #[serde(default)]
    pub enabled_when: EnabledWhen,
    #[serde(default)]
    pub manifests: Vec<PathBuf>,
    #[serde(default)]
    pub preconditions: Vec<ActionDef>,
    #[serde(default)]
    pub data: Vec<ActionDef>,
    #[serde(default)]
    pub resources: Vec<ActionDef>,
    #[serde(default)]
    pub postconditions: Vec<ActionDef>,
    #[serde(default)]
    pub on_delete: Vec<ActionDef>,
}

/// One action, selected by its `type` field
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionDef {
    EnsureCrdInstalled(EnsureCrdInstalled),
    EnsureNamespace(EnsureNamespace),
    WaitForControlPlane(WaitForControlPlane),
    WaitForPods(WaitForPods),
    WaitForResource(WaitForResource),
    ClusterDomain(ClusterDomain),
    #[serde(rename = "oauthConfig")]
    OAuthConfig(OAuthConfig),
    CreateConfigMap(CreateConfigMap),
    SelfSignedCertificate(SelfSignedCertificate),
    PatchFirstOfKind(PatchFirstOfKind),
    AnnotateNamespaces(AnnotateNamespaces),
    DeleteResource(DeleteResource),
}

impl ActionDef {
    pub fn into_action(self) -> Arc<dyn Action> {
        match self {
            ActionDef::EnsureCrdInstalled(a) => Arc::new(a),
            ActionDef::EnsureNamespace(a) => Arc::new(a),
            ActionDef::WaitForControlPlane(a) => Arc::new(a),
            ActionDef::WaitForPods(a) => Arc::new(a),
            ActionDef::WaitForResource(a) => Arc::new(a),
            ActionDef::ClusterDomain(a) => Arc::new(a),
            ActionDef::OAuthConfig(a) => Arc::new(a),
            ActionDef::CreateConfigMap(a) => Arc::new(a),
            ActionDef::SelfSignedCertificate(a) => Arc::new(a),
            ActionDef::PatchFirstOfKind(a) => Arc::new(a),
            ActionDef::AnnotateNamespaces(a) => Arc::new(a),
            ActionDef::DeleteResource(a) => Arc::new(a),
        }
    }
}

impl FeatureSetFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::Io {
            message: format!("{}: {}", path.display(), e),
        })?;
        let mut file = Self::from_yaml(&content).map_err(|e| match e {
            CliError::Config { message, help } => CliError::Config {
                message: format!("{}: {}", path.display(), message),
                help,
            },
            other => other,
        })?;
        file.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(file)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(content).map_err(|e| {
            CliError::config_with_help(
                format!("invalid feature set: {}", e),
                "each action needs a `type` such as ensureNamespace, waitForPods or deleteResource",
            )
        })?;

        let mut seen = std::collections::HashSet::new();
        for feature in &file.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(CliError::config(format!(
                    "feature '{}' is declared twice",
                    feature.name
                )));
            }
        }
        Ok(file)
    }

    /// Feature names in declaration order
    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    /// Builders for every feature, ready to load
    pub fn builders(
        &self,
        spec: &InstallerSpec,
        cluster: Arc<dyn ClusterClient>,
        values: &JsonValue,
    ) -> Vec<FeatureBuilder> {
        self.features
            .iter()
            .map(|def| {
                let enabled_when = def.enabled_when;
                let mut builder = create_feature(def.name.clone())
                    .for_spec(spec.clone())
                    .with_cluster(cluster.clone())
                    .with_values(values.clone())
                    .enabled_when(move |feature| enabled_when.holds(&feature.spec));

                for manifest in &def.manifests {
                    builder = builder.manifests(self.base_dir.join(manifest));
                }
                for action in &def.preconditions {
                    builder = builder.precondition(action.clone().into_action());
                }
                for action in &def.data {
                    builder = builder.load_data(action.clone().into_action());
                }
                for action in &def.resources {
                    builder = builder.resource(action.clone().into_action());
                }
                for action in &def.postconditions {
                    builder = builder.postcondition(action.clone().into_action());
                }
                for action in &def.on_delete {
                    builder = builder.on_delete(action.clone().into_action());
                }
                builder
            })
            .collect()
    }

    /// Load every feature into a set, stopping at the first feature that
    /// cannot be loaded
    pub async fn load_set(
        &self,
        spec: &InstallerSpec,
        cluster: Arc<dyn ClusterClient>,
        values: &JsonValue,
    ) -> Result<FeatureSet> {
        let mut set = FeatureSet::new();
        for builder in self.builders(spec, cluster, values) {
            let feature = builder.load().await.map_err(|e| match e {
                LoadError::Step { .. } => CliError::config(e.to_string()),
                LoadError::Tracker { .. } => CliError::feature(e.to_string()),
            })?;
            set.add(feature);
        }
        Ok(set)
    }
}
