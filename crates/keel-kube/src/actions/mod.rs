//! Reusable actions
//!
//! Ready-made [`Action`](crate::feature::Action) implementations for the
//! steps installers keep needing: dependency checks, readiness waits, data
//! loaders filling the feature context, imperative resource creation and
//! cleanup.
//!
//! String fields are rendered against the feature context before use, so a
//! field may refer to computed values (`"{{ mesh.namespace }}"`). Every action
//! deserializes from camelCase YAML, which lets feature sets be declared in a
//! file.

pub mod cleanup;
pub mod conditions;
pub mod loaders;
pub mod resources;

pub use cleanup::DeleteResource;
pub use conditions::{
    EnsureCrdInstalled, EnsureNamespace, GENERATED_NAMESPACE_LABEL, WaitForControlPlane,
    WaitForPods, WaitForResource,
};
pub use loaders::{ClusterDomain, OAuthConfig, SECRET_KEY, get_or_generate_secret};
pub use resources::{
    AnnotateNamespaces, CreateConfigMap, GeneratedCertificate, PatchFirstOfKind,
    SelfSignedCertificate, generate_certificate,
};
