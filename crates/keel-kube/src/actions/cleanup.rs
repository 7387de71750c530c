//! Cleanup actions
//!
//! Objects created from manifests are owned by the resource tracker and go
//! away with it. These actions cover what the tracker does not own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{effective_namespace, gvk_from_api_version};
use crate::error::{KubeError, Result};
use crate::feature::{Action, Feature};

/// Deletes one named object. An object that is already gone, or a kind the
/// cluster no longer serves, counts as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResource {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

impl DeleteResource {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Action for DeleteResource {
    fn name(&self) -> &str {
        "delete resource"
    }

    async fn run(&self, feature: &mut Feature) -> Result<()> {
        let cluster = feature.cluster()?;
        let gvk = gvk_from_api_version(&self.api_version, &self.kind);
        let name = feature.render_value(&self.name)?;

        let (resource, scope) = match cluster.resolve(&gvk).await {
            Ok(resolved) => resolved,
            Err(KubeError::UnknownKind { .. }) => {
                debug!(kind = %self.kind, "kind not served, nothing to delete");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let namespace = self
            .namespace
            .as_deref()
            .map(|ns| feature.render_value(ns))
            .transpose()?;
        let namespace = effective_namespace(&scope, namespace.as_deref());

        if cluster.delete(&resource, namespace.as_deref(), &name).await? {
            info!(kind = %self.kind, %name, "deleted");
        } else {
            debug!(kind = %self.kind, %name, "already absent");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::feature_on;
    use crate::mock::{MockCluster, Operation};

    #[tokio::test]
    async fn test_delete_resource() {
        let cluster = MockCluster::new().with_cluster_scoped("OAuthClient");
        let mut feature = feature_on(&cluster).await;
        cluster
            .seed_yaml("apiVersion: oauth.openshift.io/v1\nkind: OAuthClient\nmetadata:\n  name: opendatahub-oauth2-client\n")
            .unwrap();

        let action = DeleteResource::new(
            "oauth.openshift.io/v1",
            "OAuthClient",
            None,
            "{{ app_namespace }}-oauth2-client",
        );
        action.run(&mut feature).await.unwrap();
        assert!(cluster
            .object("oauth.openshift.io/v1", "OAuthClient", None, "opendatahub-oauth2-client")
            .is_none());

        // second run finds nothing and still succeeds
        action.run(&mut feature).await.unwrap();
        assert_eq!(cluster.count(Operation::Delete), 2);
    }

    #[tokio::test]
    async fn test_delete_of_unserved_kind_succeeds() {
        let cluster = MockCluster::new().without_kind("AuthConfig");
        let mut feature = feature_on(&cluster).await;
        DeleteResource::new("authorino.kuadrant.io/v1beta2", "AuthConfig", Some("auth-provider"), "x")
            .run(&mut feature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        let cluster = MockCluster::new();
        let mut feature = feature_on(&cluster).await;
        cluster.fail_on(Operation::Delete, "ConfigMap", 403, "Forbidden");
        let err = DeleteResource::new("v1", "ConfigMap", Some("ns"), "refs")
            .run(&mut feature)
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Api(_)));
        assert!(!err.is_not_found());
    }
}
