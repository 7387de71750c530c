//! Keel Kube - feature pipelines against a Kubernetes cluster
//!
//! This crate provides:
//! - **Cluster seam**: [`ClusterClient`] over kube-rs, plus [`MockCluster`] for tests
//! - **Resource tracker**: cluster-scoped owner of everything a feature creates
//! - **Readiness poller**: bounded retry-until-true waits
//! - **Manifest application**: create-if-absent and merge-patch of rendered documents
//! - **Features**: ordered apply pipeline and stack-ordered cleanup
//! - **Feature builder**: explicit two-phase assembly with the installer spec bound first
//! - **Feature sets**: in-order apply, reverse-order cleanup, collected failures
//! - **Actions**: reusable checks, data loaders, resource and cleanup actions

pub mod actions;
pub mod builder;
pub mod cluster;
pub mod error;
pub mod feature;
pub mod mock;
pub mod poll;
pub mod readiness;
pub mod resources;
pub mod runner;
pub mod tracker;

pub use builder::{FeatureBuilder, LoadError, create_feature};
pub use cluster::{ClusterClient, KubeCluster, gvk_from_api_version};
pub use error::{ErrorList, FeatureError, FeatureSetError, KubeError, Result};
pub use feature::{Action, ActionFuture, Feature, FeaturePhase, action_fn};
pub use mock::{MockCluster, Operation, RecordedOperation};
pub use poll::{PollConfig, poll_until_ready, poll_with};
pub use readiness::ComponentReadiness;
pub use resources::{ApplyOutcome, AppliedResource, apply_manifest};
pub use runner::FeatureSet;
pub use tracker::{FeatureTracker, FeatureTrackerSpec, FeatureTrackerStatus};
