//! CLI commands

pub mod apply;
pub mod delete;
pub mod render;

use keel_core::{InstallerSpec, parse_set_values};
use keel_kube::{ClusterClient, KubeCluster};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CliError, Result};

/// Installer spec and `--set` values shared by every command
pub struct Inputs {
    pub spec: InstallerSpec,
    pub values: JsonValue,
}

impl Inputs {
    pub fn load(config: &Path, set_values: &[String]) -> Result<Self> {
        let spec = InstallerSpec::from_file(config).map_err(|e| match e {
            keel_core::CoreError::Io(io) => CliError::Io {
                message: format!("{}: {}", config.display(), io),
            },
            other => CliError::config(format!("{}: {}", config.display(), other)),
        })?;
        spec.validate()?;
        debug!(config = %config.display(), namespace = %spec.applications_namespace, "loaded installer spec");

        let values = parse_set_values(set_values).map_err(|e| {
            CliError::config_with_help(e.to_string(), "use --set key=value, e.g. --set gateway.replicas=2")
        })?;
        Ok(Self { spec, values })
    }
}

/// Connect to the cluster from kubeconfig or the in-cluster environment
pub async fn connect() -> Result<Arc<dyn ClusterClient>> {
    let cluster = KubeCluster::try_default()
        .await
        .map_err(|e| CliError::Cluster {
            message: e.to_string(),
        })?;
    Ok(Arc::new(cluster))
}
