//! Applying rendered manifests to the cluster
//!
//! Non-patch documents are created when absent and left alone when present;
//! re-applying never updates an existing object. Patch documents are merge
//! patched onto the object they name.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{api::DynamicObject, core::GroupVersionKind};
use tracing::{debug, info};

use crate::cluster::{ClusterClient, effective_namespace, gvk_from_api_version};
use crate::error::{KubeError, Result};

/// What happened to one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    /// The object was already present and left untouched
    Unchanged,
    Patched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub outcome: ApplyOutcome,
}

impl AppliedResource {
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.kind, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// One parsed document of a manifest
#[derive(Debug, Clone)]
struct ParsedDocument {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    name: String,
}

impl ParsedDocument {
    fn parse(doc: &str) -> Result<Self> {
        let obj: DynamicObject = serde_yaml::from_str(doc)
            .map_err(|e| KubeError::InvalidManifest(format!("YAML parse error: {}", e)))?;

        let types = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidManifest("resource missing apiVersion or kind".to_string())
        })?;
        let gvk = gvk_from_api_version(&types.api_version, &types.kind);
        let name = obj.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidManifest(format!("{} missing metadata.name", types.kind))
        })?;

        Ok(Self { obj, gvk, name })
    }

    fn display_name(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, self.name),
            None => format!("{}/{}", self.gvk.kind, self.name),
        }
    }
}

/// Apply every document of `content` in order, stopping at the first failure.
///
/// Created objects get `owner` as their only owner reference.
pub async fn apply_manifest(
    cluster: &dyn ClusterClient,
    content: &str,
    is_patch: bool,
    owner: &OwnerReference,
) -> Result<Vec<AppliedResource>> {
    let mut applied = Vec::new();

    for (index, doc) in keel_engine::split_documents(content).into_iter().enumerate() {
        let parsed = ParsedDocument::parse(doc).map_err(|e| {
            KubeError::InvalidManifest(format!("document {}: {}", index, e))
        })?;

        let result = if is_patch {
            patch_document(cluster, parsed).await?
        } else {
            create_document(cluster, parsed, owner).await?
        };
        applied.push(result);
    }

    Ok(applied)
}

async fn create_document(
    cluster: &dyn ClusterClient,
    mut parsed: ParsedDocument,
    owner: &OwnerReference,
) -> Result<AppliedResource> {
    let (resource, scope) = cluster.resolve(&parsed.gvk).await?;
    let namespace = effective_namespace(&scope, parsed.obj.metadata.namespace.as_deref());
    parsed.obj.metadata.namespace = namespace.clone();
    let shown = parsed.display_name(namespace.as_deref());

    let applied = |outcome| AppliedResource {
        kind: parsed.gvk.kind.clone(),
        name: parsed.name.clone(),
        namespace: namespace.clone(),
        outcome,
    };

    if cluster
        .get(&resource, namespace.as_deref(), &parsed.name)
        .await?
        .is_some()
    {
        debug!(resource = %shown, "already present, skipping");
        return Ok(applied(ApplyOutcome::Unchanged));
    }

    parsed.obj.metadata.owner_references = Some(vec![owner.clone()]);
    match cluster
        .create(&resource, namespace.as_deref(), &parsed.obj)
        .await
    {
        Ok(_) => {
            info!(resource = %shown, "created");
            Ok(applied(ApplyOutcome::Created))
        }
        Err(e) if e.is_already_exists() => {
            debug!(resource = %shown, "created concurrently, skipping");
            Ok(applied(ApplyOutcome::Unchanged))
        }
        Err(e) => Err(e),
    }
}

async fn patch_document(
    cluster: &dyn ClusterClient,
    parsed: ParsedDocument,
) -> Result<AppliedResource> {
    let (resource, scope) = cluster.resolve(&parsed.gvk).await?;
    let namespace = if parsed.gvk.kind == "Namespace" {
        None
    } else {
        effective_namespace(&scope, parsed.obj.metadata.namespace.as_deref())
    };
    let shown = parsed.display_name(namespace.as_deref());

    let mut patch = serde_json::to_value(&parsed.obj)?;
    // the target is addressed by the URL; identity fields stay out of the body
    if let Some(metadata) = patch.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        metadata.remove("namespace");
    }

    cluster
        .merge_patch(&resource, namespace.as_deref(), &parsed.name, &patch)
        .await?;
    info!(resource = %shown, "patched");

    Ok(AppliedResource {
        kind: parsed.gvk.kind,
        name: parsed.name,
        namespace,
        outcome: ApplyOutcome::Patched,
    })
}
