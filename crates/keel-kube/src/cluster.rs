//! Cluster access seam
//!
//! Everything the engine does against the API server goes through
//! [`ClusterClient`]: typed objects (namespaces, secrets, config maps) are
//! converted to [`DynamicObject`] so a single object-safe trait covers typed
//! and custom resources alike. [`KubeCluster`] is the real implementation,
//! [`crate::mock::MockCluster`] the in-memory one used by tests.

use async_trait::async_trait;
use kube::{
    Client, Resource,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    discovery::{ApiResource, Scope},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::{KubeError, Result};

/// Namespace used for namespaced objects that do not declare one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Operations the engine needs from the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Resolve a kind to its API resource and scope
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)>;

    /// Get an object, `None` when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject>;

    /// JSON merge patch of the object
    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject>;

    /// JSON merge patch of the status subresource
    async fn merge_patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject>;

    /// List objects, across all namespaces when `namespace` is `None`
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>>;

    /// Delete an object. Returns `false` when it was already gone.
    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool>;
}

/// [`ClusterClient`] backed by a kube-rs client
pub struct KubeCluster {
    client: Client,
    resolved: Mutex<HashMap<String, (ApiResource, Scope)>>,
}

impl KubeCluster {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)> {
        let key = gvk_key(gvk);
        if let Some(hit) = self
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let (resource, capabilities) = kube::discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 404 => KubeError::UnknownKind {
                    api_version: resource_api_version(&gvk.group, &gvk.version),
                    kind: gvk.kind.clone(),
                },
                other => KubeError::Api(other),
            })?;

        let entry = (resource, capabilities.scope);
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry.clone());
        Ok(entry)
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        Ok(self
            .api(resource, namespace)
            .create(&PostParams::default(), obj)
            .await?)
    }

    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        Ok(self
            .api(resource, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn merge_patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        Ok(self
            .api(resource, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        Ok(self.api(resource, namespace).list(&params).await?.items)
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// API resource of a typed object, for use with the dynamic seam
pub fn typed_resource<K>() -> ApiResource
where
    K: Resource<DynamicType = ()>,
{
    ApiResource::erase::<K>(&())
}

/// Convert a typed object into a [`DynamicObject`]
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Convert a [`DynamicObject`] back into a typed object
pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

/// Build a GVK from an `apiVersion` string and a kind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}

pub(crate) fn resource_api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}

fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

/// Resolve a kind and an optional namespace into the namespace to address
/// the object with: namespaced kinds fall back to [`DEFAULT_NAMESPACE`],
/// cluster-scoped kinds (including `Namespace` itself) never carry one.
pub fn effective_namespace(scope: &Scope, namespace: Option<&str>) -> Option<String> {
    match scope {
        Scope::Namespaced => Some(namespace.unwrap_or(DEFAULT_NAMESPACE).to_string()),
        Scope::Cluster => None,
    }
}
