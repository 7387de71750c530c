//! Keel Core - Core types for the feature orchestration engine
//!
//! This crate provides the foundational types used throughout keel:
//! - `InstallerSpec`: The caller-supplied configuration (service mesh, auth provider)
//! - `FeatureContext`: Rendering context handed to manifest templates
//! - `naming`: DNS-subdomain-safe name derivation
//! - `endpoint`: URL host/port extraction for OAuth endpoints
//! - `values`: Dotted-path access and JSON merge patches over free-form values

pub mod context;
pub mod endpoint;
pub mod error;
pub mod naming;
pub mod spec;
pub mod values;

pub use context::{FeatureContext, OAuthDetails};
pub use endpoint::{HostPort, extract_host_and_port};
pub use error::{CoreError, Result};
pub use naming::{to_rfc1123_subdomain, tracker_name};
pub use spec::{
    AuthSpec, AuthorinoSpec, CertSpec, InstallationMode, InstallerSpec, ManagementState, MeshSpec,
    ServiceMeshSpec,
};
pub use values::{merge_patch, parse_set_values, set_path};
