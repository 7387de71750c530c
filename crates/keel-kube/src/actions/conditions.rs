//! Precondition and postcondition checks

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{gvk_from_api_version, to_dynamic, typed_resource};
use crate::error::{KubeError, Result};
use crate::feature::{Action, Feature};
use crate::poll::{PollConfig, poll_with};
use crate::readiness::{control_plane_gvk, control_plane_ready, crd_installed, pods_ready, resource_exists};

/// Label put on namespaces created by [`EnsureNamespace`]
pub const GENERATED_NAMESPACE_LABEL: &str = "keel.dev/generated-namespace";

/// Fails unless the cluster serves the given kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsureCrdInstalled {
    pub api_version: String,
    pub kind: String,
}

impl EnsureCrdInstalled {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

#[async_trait]
impl Action for EnsureCrdInstalled {
    fn name(&self) -> &str {
        "ensure CRD installed"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = gvk_from_api_version(&self.api_version, &self.kind);
        if crd_installed(cluster.as_ref(), &gvk).await {
            debug!(kind = %self.kind, "CRD installed");
            Ok(())
        } else {
            Err(KubeError::ConditionNotMet(format!(
                "CRD for {}/{} is not installed",
                self.api_version, self.kind
            )))
        }
    }
}

/// Creates a namespace when it does not exist yet.
///
/// The namespace is labelled as generated but not owned by the tracker:
/// deleting the feature leaves it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureNamespace {
    pub name: String,
}

impl EnsureNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Action for EnsureNamespace {
    fn name(&self) -> &str {
        "ensure namespace"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let name = feature.render_value(&self.name)?;
        let resource = typed_resource::<Namespace>();

        if cluster.get(&resource, None, &name).await?.is_some() {
            debug!(namespace = %name, "namespace exists");
            return Ok(());
        }

        let mut namespace = Namespace::default();
        namespace.metadata.name = Some(name.clone());
        namespace.metadata.labels =
            Some([(GENERATED_NAMESPACE_LABEL.to_string(), "true".to_string())].into());

        match cluster.create(&resource, None, &to_dynamic(&namespace)?).await {
            Ok(_) => {
                info!(namespace = %name, "created namespace");
                Ok(())
            }
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Waits for the configured service mesh control plane to report every
/// component ready
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitForControlPlane {
    #[serde(default)]
    pub poll: PollConfig,
}

#[async_trait]
impl Action for WaitForControlPlane {
    fn name(&self) -> &str {
        "wait for control plane"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = control_plane_gvk();
        if !crd_installed(cluster.as_ref(), &gvk).await {
            return Err(KubeError::ConditionNotMet(
                "service mesh control plane CRD is not installed".to_string(),
            ));
        }

        let namespace = feature.context.mesh.namespace.clone();
        let name = feature.context.mesh.name.clone();
        info!(%namespace, %name, "waiting for control plane");
        let ready = poll_with(&self.poll, || {
            control_plane_ready(cluster.as_ref(), &namespace, &name)
        })
        .await?;

        if ready {
            Ok(())
        } else {
            Err(KubeError::Timeout {
                what: format!("control plane {}/{}", namespace, name),
                timeout: self.poll.timeout,
            })
        }
    }
}

/// Waits until a namespace has pods and all of them are ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitForPods {
    pub namespace: String,
    #[serde(default)]
    pub poll: PollConfig,
}

impl WaitForPods {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

#[async_trait]
impl Action for WaitForPods {
    fn name(&self) -> &str {
        "wait for pods"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let namespace = feature.render_value(&self.namespace)?;
        info!(%namespace, "waiting for pods");

        if poll_with(&self.poll, || pods_ready(cluster.as_ref(), &namespace)).await? {
            Ok(())
        } else {
            Err(KubeError::Timeout {
                what: format!("pods in namespace {}", namespace),
                timeout: self.poll.timeout,
            })
        }
    }
}

/// Waits until a named object exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForResource {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default)]
    pub poll: PollConfig,
}

#[async_trait]
impl Action for WaitForResource {
    fn name(&self) -> &str {
        "wait for resource"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = gvk_from_api_version(&self.api_version, &self.kind);
        let namespace = self
            .namespace
            .as_deref()
            .map(|ns| feature.render_value(ns))
            .transpose()?;
        let name = feature.render_value(&self.name)?;
        info!(kind = %self.kind, %name, "waiting for resource");

        let exists = poll_with(&self.poll, || {
            resource_exists(cluster.as_ref(), &gvk, namespace.as_deref(), &name)
        })
        .await?;

        if exists {
            Ok(())
        } else {
            Err(KubeError::Timeout {
                what: format!("{} {}", self.kind, name),
                timeout: self.poll.timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::feature_on;
    use crate::mock::MockCluster;
    use std::time::Duration;

    fn quick_poll() -> PollConfig {
        PollConfig::new(Duration::from_secs(1), Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_ensure_crd_installed() {
        let cluster = MockCluster::new().without_kind("AuthConfig");
        let mut feature = feature_on(&cluster).await;
        let check = EnsureCrdInstalled::new("authorino.kuadrant.io/v1beta2", "AuthConfig");

        let err = check.run(&mut feature).await.unwrap_err();
        assert!(err.to_string().contains("AuthConfig"));

        cluster.install_kind("AuthConfig");
        check.run(&mut feature).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_namespace_is_idempotent_and_not_owned() {
        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        let action = EnsureNamespace::new("{{ auth.namespace }}");

        action.run(&mut feature).await.unwrap();
        action.run(&mut feature).await.unwrap();

        let ns = cluster.object("v1", "Namespace", None, "auth-provider").unwrap();
        assert_eq!(
            ns.metadata.labels.unwrap()[GENERATED_NAMESPACE_LABEL],
            "true"
        );
        assert!(ns.metadata.owner_references.is_none());
        assert_eq!(cluster.objects_of_kind("Namespace").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_pods_times_out() {
        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        let action = WaitForPods::new("{{ mesh.namespace }}").with_poll(quick_poll());

        let err = action.run(&mut feature).await.unwrap_err();
        assert!(matches!(err, KubeError::Timeout { .. }));
        assert!(err.to_string().contains("istio-system"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_control_plane() {
        let cluster = MockCluster::new().without_kind("ServiceMeshControlPlane");
        let mut feature = feature_on(&cluster).await;
        let action = WaitForControlPlane { poll: quick_poll() };

        let err = action.run(&mut feature).await.unwrap_err();
        assert!(matches!(err, KubeError::ConditionNotMet(_)));

        cluster.install_kind("ServiceMeshControlPlane");
        cluster
            .seed_yaml(
                r#"
apiVersion: maistra.io/v2
kind: ServiceMeshControlPlane
metadata:
  name: basic
  namespace: istio-system
status:
  readiness:
    components:
      ready: [istiod]
"#,
            )
            .unwrap();
        action.run(&mut feature).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_resource() {
        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        let action: WaitForResource = serde_yaml::from_str(
            "apiVersion: v1\nkind: Secret\nnamespace: \"{{ app_namespace }}\"\nname: creds\npoll:\n  intervalSeconds: 1\n  timeoutSeconds: 2\n",
        )
        .unwrap();

        assert!(action.run(&mut feature).await.is_err());

        cluster
            .seed_yaml("apiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n  namespace: opendatahub\n")
            .unwrap();
        action.run(&mut feature).await.unwrap();
    }
}
