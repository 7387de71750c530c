//! Resource tracker
//!
//! A cluster-scoped `FeatureTracker` object exists per `(namespace, feature)`
//! pair. Every object a feature creates carries an owner reference to it, so
//! deleting the tracker lets the garbage collector remove the rest.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, OwnerReference, Time};
use kube::{CustomResource, Resource, ResourceExt, api::ObjectMeta, discovery::ApiResource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{ClusterClient, from_dynamic, to_dynamic, typed_resource};
use crate::error::{KubeError, Result};

pub const CONDITION_AVAILABLE: &str = "Available";
pub const CONDITION_DEGRADED: &str = "Degraded";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "features.keel.dev",
    version = "v1",
    kind = "FeatureTracker",
    status = "FeatureTrackerStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTrackerSpec {
    /// What produced the tracker
    pub source: Source,
    /// Applications namespace of the installation the feature belongs to
    pub app_namespace: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Source {
    #[serde(rename = "type")]
    pub source_type: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTrackerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl FeatureTrackerStatus {
    /// Status after a successful apply
    pub fn available(phase: &str) -> Self {
        Self {
            phase: Some(phase.to_string()),
            conditions: vec![condition(CONDITION_AVAILABLE, "True", phase, "feature applied")],
        }
    }

    /// Status after an apply that failed in `phase`
    pub fn degraded(phase: &str, message: impl Into<String>) -> Self {
        Self {
            phase: Some(phase.to_string()),
            conditions: vec![condition(CONDITION_DEGRADED, "True", phase, message)],
        }
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

fn condition(type_: &str, status: &str, reason: &str, message: impl Into<String>) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: message.into(),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// API resource of [`FeatureTracker`]
pub fn tracker_resource() -> ApiResource {
    typed_resource::<FeatureTracker>()
}

/// Fetch the tracker for `feature`, creating it when absent.
///
/// Safe to call repeatedly: a create that races with another writer and
/// loses with AlreadyExists falls back to reading the winner's object.
pub async fn get_or_create(
    cluster: &dyn ClusterClient,
    app_namespace: &str,
    feature: &str,
) -> Result<FeatureTracker> {
    let name = keel_core::tracker_name(app_namespace, feature);
    let resource = tracker_resource();

    if let Some(existing) = cluster.get(&resource, None, &name).await? {
        debug!(tracker = %name, "reusing resource tracker");
        return from_dynamic(existing);
    }

    let tracker = FeatureTracker {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        spec: FeatureTrackerSpec {
            source: Source {
                source_type: "Feature".to_string(),
                name: feature.to_string(),
            },
            app_namespace: app_namespace.to_string(),
        },
        status: None,
    };

    match cluster.create(&resource, None, &to_dynamic(&tracker)?).await {
        Ok(created) => {
            info!(tracker = %name, "created resource tracker");
            from_dynamic(created)
        }
        Err(e) if e.is_already_exists() => {
            let existing = cluster
                .get(&resource, None, &name)
                .await?
                .ok_or_else(|| KubeError::InvalidConfig(format!("tracker '{}' vanished", name)))?;
            from_dynamic(existing)
        }
        Err(e) => Err(e),
    }
}

/// Owner reference pointing at `tracker`
pub fn owner_reference(tracker: &FeatureTracker) -> Result<OwnerReference> {
    let uid = tracker
        .meta()
        .uid
        .clone()
        .ok_or_else(|| KubeError::InvalidConfig(format!("tracker '{}' has no uid", tracker.name_any())))?;

    Ok(OwnerReference {
        api_version: FeatureTracker::api_version(&()).to_string(),
        kind: FeatureTracker::kind(&()).to_string(),
        name: tracker.name_any(),
        uid,
        ..Default::default()
    })
}

/// Delete the tracker; absence is not an error
pub async fn delete(cluster: &dyn ClusterClient, name: &str) -> Result<()> {
    if cluster.delete(&tracker_resource(), None, name).await? {
        info!(tracker = %name, "deleted resource tracker");
    } else {
        debug!(tracker = %name, "resource tracker already absent");
    }
    Ok(())
}

/// Overwrite the tracker status
pub async fn update_status(
    cluster: &dyn ClusterClient,
    name: &str,
    status: &FeatureTrackerStatus,
) -> Result<()> {
    let patch = serde_json::json!({ "status": status });
    cluster
        .merge_patch_status(&tracker_resource(), None, name, &patch)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockCluster, Operation};

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let cluster = MockCluster::new();

        let first = get_or_create(&cluster, "opendatahub", "Mesh OAuth").await.unwrap();
        let second = get_or_create(&cluster, "opendatahub", "Mesh OAuth").await.unwrap();

        assert_eq!(first.name_any(), "opendatahub-mesh-oauth");
        assert_eq!(first.uid(), second.uid());
        assert_eq!(cluster.objects_of_kind("FeatureTracker").len(), 1);
        assert_eq!(cluster.count(Operation::Create), 1);
        assert_eq!(first.spec.source.name, "Mesh OAuth");
    }

    #[tokio::test]
    async fn test_owner_reference() {
        let cluster = MockCluster::new();
        let tracker = get_or_create(&cluster, "ns", "f").await.unwrap();
        let owner = owner_reference(&tracker).unwrap();

        assert_eq!(owner.api_version, "features.keel.dev/v1");
        assert_eq!(owner.kind, "FeatureTracker");
        assert_eq!(owner.name, "ns-f");
        assert_eq!(Some(owner.uid), tracker.uid());
    }

    #[tokio::test]
    async fn test_delete_tolerates_absence() {
        let cluster = MockCluster::new();
        get_or_create(&cluster, "ns", "f").await.unwrap();

        delete(&cluster, "ns-f").await.unwrap();
        delete(&cluster, "ns-f").await.unwrap();
        assert!(cluster.objects_of_kind("FeatureTracker").is_empty());
    }

    #[tokio::test]
    async fn test_status_update() {
        let cluster = MockCluster::new();
        get_or_create(&cluster, "ns", "f").await.unwrap();

        update_status(&cluster, "ns-f", &FeatureTrackerStatus::degraded("PreConditions", "crd missing"))
            .await
            .unwrap();

        let stored = cluster
            .object("features.keel.dev/v1", "FeatureTracker", None, "ns-f")
            .unwrap();
        let tracker: FeatureTracker = from_dynamic(stored).unwrap();
        let status = tracker.status.unwrap();
        assert_eq!(status.phase.as_deref(), Some("PreConditions"));
        let degraded = status.condition(CONDITION_DEGRADED).unwrap();
        assert_eq!(degraded.reason, "PreConditions");
        assert_eq!(degraded.message, "crd missing");
    }
}
