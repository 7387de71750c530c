//! Rendering context handed to manifest templates and mutated by data loaders

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::spec::{AuthSpec, InstallerSpec, MeshSpec};
use crate::values::merge_patch;

/// Everything a feature knows about its target: the caller's spec plus fields
/// computed at apply time.
///
/// Serialized with snake_case keys at the top level, so templates address it as
/// `{{ app_namespace }}`, `{{ mesh.namespace }}`, `{{ oauth.client_secret }}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureContext {
    pub app_namespace: String,
    pub mesh: MeshSpec,
    pub auth: AuthSpec,

    /// Cluster base domain, filled by the domain loader
    #[serde(default)]
    pub domain: String,

    /// OAuth details, filled by the OAuth loader
    #[serde(default)]
    pub oauth: OAuthDetails,

    /// Extra values supplied by the caller
    #[serde(default)]
    pub values: JsonValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OAuthDetails {
    pub authz_endpoint: String,
    pub token_endpoint: String,
    /// Hostname of the OAuth server
    pub route: String,
    pub port: String,
    pub client_secret: String,
    pub hmac: String,
}

impl FeatureContext {
    pub fn from_spec(spec: &InstallerSpec) -> Self {
        Self {
            app_namespace: spec.applications_namespace.clone(),
            mesh: spec.service_mesh.mesh.clone(),
            auth: spec.service_mesh.auth.clone(),
            domain: String::new(),
            oauth: OAuthDetails::default(),
            values: JsonValue::Object(Default::default()),
        }
    }

    /// Merge extra values into `values`
    pub fn with_values(mut self, extra: &JsonValue) -> Self {
        merge_patch(&mut self.values, extra);
        self
    }
}
