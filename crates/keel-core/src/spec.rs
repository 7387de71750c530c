//! Installer specification
//!
//! The caller-supplied configuration every feature operates on. Defaults are
//! stated literally in the `Default` impls below and picked up by serde for any
//! key the YAML omits.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// The only auth provider the mesh features know how to configure
pub const SUPPORTED_AUTH_PROVIDER: &str = "authorino";

/// Top-level installer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallerSpec {
    /// Namespace the add-on's applications live in
    pub applications_namespace: String,

    /// Service mesh integration settings
    pub service_mesh: ServiceMeshSpec,
}

impl Default for InstallerSpec {
    fn default() -> Self {
        Self {
            applications_namespace: "opendatahub".to_string(),
            service_mesh: ServiceMeshSpec::default(),
        }
    }
}

impl InstallerSpec {
    /// Load a spec from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a spec from YAML. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Check the spec for values the features cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.applications_namespace.trim().is_empty() {
            return Err(CoreError::InvalidSpec {
                message: "applicationsNamespace must not be empty".to_string(),
            });
        }

        let mesh = &self.service_mesh.mesh;
        if mesh.name.is_empty() || mesh.namespace.is_empty() {
            return Err(CoreError::InvalidSpec {
                message: "serviceMesh.mesh requires both name and namespace".to_string(),
            });
        }

        let auth = &self.service_mesh.auth;
        if auth.name != SUPPORTED_AUTH_PROVIDER {
            return Err(CoreError::InvalidSpec {
                message: format!(
                    "unsupported auth provider '{}', only '{}' is supported",
                    auth.name, SUPPORTED_AUTH_PROVIDER
                ),
            });
        }
        if auth.namespace.is_empty() {
            return Err(CoreError::InvalidSpec {
                message: "serviceMesh.auth.namespace must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Whether a component should be installed by the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagementState {
    #[default]
    Managed,
    Removed,
    Unmanaged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMeshSpec {
    pub management_state: ManagementState,
    pub mesh: MeshSpec,
    pub auth: AuthSpec,
}

impl Default for ServiceMeshSpec {
    fn default() -> Self {
        Self {
            management_state: ManagementState::Managed,
            mesh: MeshSpec::default(),
            auth: AuthSpec::default(),
        }
    }
}

impl ServiceMeshSpec {
    pub fn is_managed(&self) -> bool {
        self.management_state == ManagementState::Managed
    }
}

/// How the control plane gets onto the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallationMode {
    /// The control plane is expected to exist already
    #[default]
    PreInstalled,
    /// Install a minimal control plane as part of the feature set
    Minimal,
}

/// Service mesh control plane location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshSpec {
    pub name: String,
    pub namespace: String,
    pub installation_mode: InstallationMode,
    pub certificate: CertSpec,
}

impl Default for MeshSpec {
    fn default() -> Self {
        Self {
            name: "basic".to_string(),
            namespace: "istio-system".to_string(),
            installation_mode: InstallationMode::PreInstalled,
            certificate: CertSpec::default(),
        }
    }
}

/// Ingress gateway certificate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertSpec {
    /// Name of the TLS secret
    pub name: String,
    /// Generate a self-signed certificate when the secret is absent
    pub generate: bool,
}

impl Default for CertSpec {
    fn default() -> Self {
        Self {
            name: "opendatahub-dashboard-cert".to_string(),
            generate: true,
        }
    }
}

/// External authorization provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSpec {
    pub name: String,
    pub namespace: String,
    pub authorino: AuthorinoSpec,
}

impl Default for AuthSpec {
    fn default() -> Self {
        Self {
            name: SUPPORTED_AUTH_PROVIDER.to_string(),
            namespace: "auth-provider".to_string(),
            authorino: AuthorinoSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthorinoSpec {
    /// Name used to register the provider with the mesh
    pub name: String,
    /// Token audiences accepted by the provider
    pub audiences: Vec<String>,
    /// `key=value` label selecting AuthConfigs the provider watches
    pub label: String,
    pub image: String,
}

impl Default for AuthorinoSpec {
    fn default() -> Self {
        Self {
            name: "authorino-mesh-authz-provider".to_string(),
            audiences: vec!["https://kubernetes.default.svc".to_string()],
            label: "authorino/topic=odh".to_string(),
            image: "quay.io/kuadrant/authorino:v0.13.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let spec = InstallerSpec::from_yaml("").unwrap();
        assert_eq!(spec, InstallerSpec::default());
        assert_eq!(spec.service_mesh.mesh.name, "basic");
        assert_eq!(spec.service_mesh.mesh.namespace, "istio-system");
        assert_eq!(spec.service_mesh.auth.authorino.audiences, vec!["https://kubernetes.default.svc"]);
        assert!(spec.service_mesh.mesh.certificate.generate);
    }

    #[test]
    fn test_partial_yaml_keeps_nested_defaults() {
        let spec = InstallerSpec::from_yaml(
            r#"
applicationsNamespace: my-apps
serviceMesh:
  mesh:
    namespace: mesh-system
    installationMode: minimal
"#,
        )
        .unwrap();

        assert_eq!(spec.applications_namespace, "my-apps");
        assert_eq!(spec.service_mesh.mesh.namespace, "mesh-system");
        assert_eq!(spec.service_mesh.mesh.name, "basic");
        assert_eq!(spec.service_mesh.mesh.installation_mode, InstallationMode::Minimal);
        assert_eq!(spec.service_mesh.auth.namespace, "auth-provider");
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_auth_provider() {
        let mut spec = InstallerSpec::default();
        spec.service_mesh.auth.name = "keycloak".to_string();
        let err = spec.validate().unwrap_err();
        assert!(err.to_string().contains("keycloak"));
    }

    #[test]
    fn test_validate_rejects_empty_namespace() {
        let spec = InstallerSpec {
            applications_namespace: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(spec.validate(), Err(CoreError::InvalidSpec { .. })));
    }
}
