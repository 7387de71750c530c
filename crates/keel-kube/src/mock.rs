//! In-memory cluster for testing
//!
//! Behaves like a small API server: objects are keyed by kind, namespace and
//! name, creates assign a uid, deletes cascade to objects whose owner
//! references point at the deleted uid (standing in for the garbage
//! collector), and every call is recorded for assertions.

use async_trait::async_trait;
use kube::{
    api::DynamicObject,
    core::GroupVersionKind,
    discovery::{ApiResource, Scope},
};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cluster::{ClusterClient, resource_api_version};
use crate::error::{KubeError, Result};

/// Kinds served cluster-wide by default
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleBinding",
    "FeatureTracker",
];

/// Operation kinds recorded by [`MockCluster`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Patch,
    PatchStatus,
    List,
    Delete,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedOperation {
    pub operation: Operation,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    api_version: String,
    kind: String,
    namespace: Option<String>,
    name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    operations: Vec<RecordedOperation>,
    /// Keyed by operation, kind and object name (`None` for every object)
    failures: HashMap<(Operation, String, Option<String>), (u16, String)>,
    /// Kinds whose next create loses a race against another writer
    racing_creates: HashSet<String>,
    missing_kinds: HashSet<String>,
    cluster_scoped: HashSet<String>,
    next_uid: u64,
}

/// In-memory [`ClusterClient`]
#[derive(Clone)]
pub struct MockCluster {
    state: Arc<RwLock<State>>,
}

impl MockCluster {
    pub fn new() -> Self {
        let state = State {
            cluster_scoped: CLUSTER_SCOPED_KINDS.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `kind` cluster-wide
    pub fn with_cluster_scoped(self, kind: &str) -> Self {
        self.write().cluster_scoped.insert(kind.to_string());
        self
    }

    /// Pretend `kind` is not installed: resolving and listing it fail with 404
    pub fn without_kind(self, kind: &str) -> Self {
        self.write().missing_kinds.insert(kind.to_string());
        self
    }

    /// Install a previously missing kind
    pub fn install_kind(&self, kind: &str) {
        self.write().missing_kinds.remove(kind);
    }

    /// Make every `operation` on `kind` fail with the given status code
    pub fn fail_on(&self, operation: Operation, kind: &str, code: u16, reason: &str) {
        self.write()
            .failures
            .insert((operation, kind.to_string(), None), (code, reason.to_string()));
    }

    /// Make every `operation` on one named object of `kind` fail
    pub fn fail_on_object(
        &self,
        operation: Operation,
        kind: &str,
        name: &str,
        code: u16,
        reason: &str,
    ) {
        self.write().failures.insert(
            (operation, kind.to_string(), Some(name.to_string())),
            (code, reason.to_string()),
        );
    }

    /// The next create of `kind` behaves as if another writer got there
    /// first: an empty object with that name is stored and the create fails
    /// with AlreadyExists.
    pub fn race_next_create(&self, kind: &str) {
        self.write().racing_creates.insert(kind.to_string());
    }

    /// Store an object as-is (it must carry apiVersion and kind). A uid is
    /// assigned when missing.
    pub fn seed(&self, mut obj: DynamicObject) {
        let mut state = self.write();
        if obj.metadata.uid.is_none() {
            state.next_uid += 1;
            obj.metadata.uid = Some(format!("uid-{}", state.next_uid));
        }
        if let Some(key) = key_of(&obj) {
            state.objects.insert(key, obj);
        }
    }

    /// Parse a YAML object and seed it
    pub fn seed_yaml(&self, yaml: &str) -> Result<()> {
        let obj: DynamicObject = serde_yaml::from_str(yaml)?;
        self.seed(obj);
        Ok(())
    }

    /// Look up a stored object without recording an operation
    pub fn object(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        let key = ObjectKey {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        };
        self.read().objects.get(&key).cloned()
    }

    /// All stored objects of a kind
    pub fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.read()
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.read().objects.len()
    }

    /// Every recorded call, oldest first
    pub fn operations(&self) -> Vec<RecordedOperation> {
        self.read().operations.clone()
    }

    /// Number of recorded calls of one kind of operation
    pub fn count(&self, operation: Operation) -> usize {
        self.read()
            .operations
            .iter()
            .filter(|op| op.operation == operation)
            .count()
    }

    pub fn reset_operations(&self) {
        self.write().operations.clear();
    }

    /// Record the call and return the injected failure for it, if any
    fn begin(
        &self,
        operation: Operation,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let mut state = self.write();
        state.operations.push(RecordedOperation {
            operation,
            kind: resource.kind.clone(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        });

        if state.missing_kinds.contains(&resource.kind) {
            return Err(KubeError::api_status(
                404,
                "NotFound",
                format!("the server could not find the requested resource ({})", resource.plural),
            ));
        }
        let failure = state
            .failures
            .get(&(operation, resource.kind.clone(), Some(name.to_string())))
            .or_else(|| state.failures.get(&(operation, resource.kind.clone(), None)));
        if let Some((code, reason)) = failure {
            return Err(KubeError::api_status(
                *code,
                reason,
                format!("injected failure for {:?} {}", operation, resource.kind),
            ));
        }
        Ok(())
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn key_of(obj: &DynamicObject) -> Option<ObjectKey> {
    let types = obj.types.as_ref()?;
    Some(ObjectKey {
        api_version: types.api_version.clone(),
        kind: types.kind.clone(),
        namespace: obj.metadata.namespace.clone(),
        name: obj.metadata.name.clone()?,
    })
}

fn resource_key(resource: &ApiResource, namespace: Option<&str>, name: &str) -> ObjectKey {
    ObjectKey {
        api_version: resource.api_version.clone(),
        kind: resource.kind.clone(),
        namespace: namespace.map(str::to_string),
        name: name.to_string(),
    }
}

fn not_found(resource: &ApiResource, name: &str) -> KubeError {
    KubeError::api_status(
        404,
        "NotFound",
        format!("{} \"{}\" not found", resource.plural, name),
    )
}

/// Equality-based selector: `a=b,c` matches objects labelled `a=b` that also
/// carry label `c`.
fn matches_selector(obj: &DynamicObject, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = obj.metadata.labels.clone().unwrap_or_default();
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

fn bump_version(obj: &mut DynamicObject) {
    let next = obj
        .metadata
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    obj.metadata.resource_version = Some(next.to_string());
}

fn patch_object(obj: &DynamicObject, patch: &JsonValue) -> Result<DynamicObject> {
    let mut value = serde_json::to_value(obj)?;
    keel_core::merge_patch(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn resolve(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, Scope)> {
        let state = self.read();
        if state.missing_kinds.contains(&gvk.kind) {
            return Err(KubeError::UnknownKind {
                api_version: resource_api_version(&gvk.group, &gvk.version),
                kind: gvk.kind.clone(),
            });
        }
        let plural = format!("{}s", gvk.kind.to_lowercase());
        let scope = if state.cluster_scoped.contains(&gvk.kind) {
            Scope::Cluster
        } else {
            Scope::Namespaced
        };
        Ok((ApiResource::from_gvk_with_plural(gvk, &plural), scope))
    }

    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.begin(Operation::Get, resource, namespace, name)?;
        Ok(self
            .read()
            .objects
            .get(&resource_key(resource, namespace, name))
            .cloned())
    }

    async fn create(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        obj: &DynamicObject,
    ) -> Result<DynamicObject> {
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| KubeError::InvalidManifest("metadata.name is required".to_string()))?;
        self.begin(Operation::Create, resource, namespace, &name)?;

        let key = resource_key(resource, namespace, &name);
        let mut state = self.write();
        if state.racing_creates.remove(&resource.kind) {
            let mut winner = DynamicObject::new(&name, resource);
            winner.metadata.namespace = namespace.map(str::to_string);
            winner.data = JsonValue::Object(Default::default());
            state.next_uid += 1;
            winner.metadata.uid = Some(format!("uid-{}", state.next_uid));
            winner.metadata.resource_version = Some("1".to_string());
            state.objects.insert(key.clone(), winner);
        }
        if state.objects.contains_key(&key) {
            return Err(KubeError::api_status(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", resource.plural, name),
            ));
        }

        let mut stored = obj.clone();
        stored.types = Some(kube::core::TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        stored.metadata.namespace = namespace.map(str::to_string);
        state.next_uid += 1;
        stored.metadata.uid = Some(format!("uid-{}", state.next_uid));
        stored.metadata.resource_version = Some("1".to_string());

        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn merge_patch(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        self.begin(Operation::Patch, resource, namespace, name)?;

        let key = resource_key(resource, namespace, name);
        let mut state = self.write();
        let existing = state
            .objects
            .get(&key)
            .ok_or_else(|| not_found(resource, name))?;

        // identity fields are not patchable
        let mut patched = patch_object(existing, patch)?;
        patched.types = existing.types.clone();
        patched.metadata.name = existing.metadata.name.clone();
        patched.metadata.namespace = existing.metadata.namespace.clone();
        patched.metadata.uid = existing.metadata.uid.clone();
        bump_version(&mut patched);

        state.objects.insert(key, patched.clone());
        Ok(patched)
    }

    async fn merge_patch_status(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
        patch: &JsonValue,
    ) -> Result<DynamicObject> {
        self.begin(Operation::PatchStatus, resource, namespace, name)?;

        let key = resource_key(resource, namespace, name);
        let mut state = self.write();
        let existing = state
            .objects
            .get(&key)
            .ok_or_else(|| not_found(resource, name))?;

        let status_only = serde_json::json!({ "status": patch.get("status").cloned().unwrap_or(JsonValue::Null) });
        let mut patched = patch_object(existing, &status_only)?;
        bump_version(&mut patched);

        state.objects.insert(key, patched.clone());
        Ok(patched)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        self.begin(Operation::List, resource, namespace, "")?;

        Ok(self
            .read()
            .objects
            .iter()
            .filter(|(key, _)| {
                key.api_version == resource.api_version
                    && key.kind == resource.kind
                    && (namespace.is_none() || key.namespace.as_deref() == namespace)
            })
            .map(|(_, obj)| obj)
            .filter(|obj| matches_selector(obj, label_selector))
            .cloned()
            .collect())
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool> {
        self.begin(Operation::Delete, resource, namespace, name)?;

        let mut state = self.write();
        let Some(removed) = state.objects.remove(&resource_key(resource, namespace, name)) else {
            return Ok(false);
        };

        // cascade to dependents, transitively
        let mut orphaned: Vec<String> = removed.metadata.uid.into_iter().collect();
        while let Some(owner_uid) = orphaned.pop() {
            let dependents: Vec<ObjectKey> = state
                .objects
                .iter()
                .filter(|(_, obj)| {
                    obj.metadata
                        .owner_references
                        .as_ref()
                        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner_uid))
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in dependents {
                if let Some(obj) = state.objects.remove(&key) {
                    orphaned.extend(obj.metadata.uid);
                }
            }
        }

        Ok(true)
    }
}
