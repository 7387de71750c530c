//! Cluster-observable readiness checks
//!
//! Each check performs a single read. Combine them with
//! [`crate::poll::poll_until_ready`] to wait for a condition.

use k8s_openapi::api::core::v1::Pod;
use kube::{api::DynamicObject, core::GroupVersionKind};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::cluster::{ClusterClient, effective_namespace, from_dynamic, typed_resource};
use crate::error::Result;

/// Kind of the service mesh control plane
pub fn control_plane_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("maistra.io", "v2", "ServiceMeshControlPlane")
}

/// Readiness buckets reported by a control plane under
/// `status.readiness.components`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ComponentReadiness {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ready: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pending: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub unready: Vec<String>,
}

/// Control planes report an empty bucket as `null`
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ComponentReadiness {
    /// Decode the readiness buckets of a control plane object. Missing status
    /// fields decode as empty buckets.
    pub fn from_object(obj: &DynamicObject) -> Result<Self> {
        match obj.data.pointer("/status/readiness/components") {
            Some(components) if !components.is_null() => {
                Ok(serde_json::from_value(components.clone())?)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Ready when something reports ready and nothing is pending or unready
    pub fn is_ready(&self) -> bool {
        !self.ready.is_empty() && self.pending.is_empty() && self.unready.is_empty()
    }
}

/// Whether the cluster serves `gvk`.
///
/// Lists the resource once; any error, including RBAC denial, counts as not
/// installed.
pub async fn crd_installed(cluster: &dyn ClusterClient, gvk: &GroupVersionKind) -> bool {
    let resource = match cluster.resolve(gvk).await {
        Ok((resource, _)) => resource,
        Err(e) => {
            debug!(kind = %gvk.kind, error = %e, "kind not resolvable");
            return false;
        }
    };
    match cluster.list(&resource, None, None).await {
        Ok(_) => true,
        Err(e) => {
            debug!(kind = %gvk.kind, error = %e, "kind not listable");
            false
        }
    }
}

/// Whether the named control plane exists and reports every component ready
pub async fn control_plane_ready(
    cluster: &dyn ClusterClient,
    namespace: &str,
    name: &str,
) -> Result<bool> {
    let (resource, _) = cluster.resolve(&control_plane_gvk()).await?;
    let Some(smcp) = cluster.get(&resource, Some(namespace), name).await? else {
        debug!(namespace, name, "control plane not found");
        return Ok(false);
    };

    let readiness = ComponentReadiness::from_object(&smcp)?;
    debug!(
        ready = readiness.ready.len(),
        pending = readiness.pending.len(),
        unready = readiness.unready.len(),
        "control plane readiness"
    );
    Ok(readiness.is_ready())
}

/// Whether every pod in `namespace` is ready.
///
/// An empty namespace is not ready. Completed pods count as ready.
pub async fn pods_ready(cluster: &dyn ClusterClient, namespace: &str) -> Result<bool> {
    let pods = cluster
        .list(&typed_resource::<Pod>(), Some(namespace), None)
        .await?;
    if pods.is_empty() {
        return Ok(false);
    }

    for obj in pods {
        let pod: Pod = from_dynamic(obj)?;
        if !pod_ready(&pod) {
            debug!(namespace, pod = ?pod.metadata.name, "pod not ready");
            return Ok(false);
        }
    }
    Ok(true)
}

fn pod_ready(pod: &Pod) -> bool {
    let Some(status) = &pod.status else {
        return false;
    };
    if status.phase.as_deref() == Some("Succeeded") {
        return true;
    }
    status
        .conditions
        .as_ref()
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Whether an object exists
pub async fn resource_exists(
    cluster: &dyn ClusterClient,
    gvk: &GroupVersionKind,
    namespace: Option<&str>,
    name: &str,
) -> Result<bool> {
    let (resource, scope) = cluster.resolve(gvk).await?;
    let namespace = effective_namespace(&scope, namespace);
    Ok(cluster
        .get(&resource, namespace.as_deref(), name)
        .await?
        .is_some())
}
