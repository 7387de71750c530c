//! Error types for keel-kube

use thiserror::Error;

/// Result type for keel-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while talking to the cluster or running feature actions
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The cluster does not serve the requested kind
    #[error("unknown resource type: {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },

    /// A check did not hold
    #[error("{0}")]
    ConditionNotMet(String),

    /// A readiness wait ran out of time
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout {
        what: String,
        timeout: std::time::Duration,
    },

    /// The feature was used without a cluster client bound to it
    #[error("no cluster client configured for feature '{0}'")]
    NoCluster(String),

    /// The feature has no resource tracker to own created objects
    #[error("feature '{0}' has no resource tracker")]
    NoTracker(String),

    /// Manifest content could not be turned into cluster objects
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Manifest discovery or rendering failed
    #[error("template error: {0}")]
    Engine(#[from] keel_engine::EngineError),

    /// Configuration or context error
    #[error("invalid configuration: {0}")]
    Core(#[from] keel_core::CoreError),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP error talking to something other than the API server
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Certificate generation failed
    #[error("certificate error: {0}")]
    Certificate(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Some targets of a multi-object operation failed; the rest went through
    #[error("{what}: {} failed{errors}", .errors.len())]
    Partial { what: String, errors: ErrorList },
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<rcgen::Error> for KubeError {
    fn from(e: rcgen::Error) -> Self {
        KubeError::Certificate(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if a create failed because the object already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            KubeError::Api(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "AlreadyExists"
        )
    }

    /// Build an API-shaped error, as the API server would return it
    pub fn api_status(code: u16, reason: &str, message: impl Into<String>) -> Self {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: message.into(),
            reason: reason.to_string(),
            code,
        }))
    }
}

/// Errors collected from every action of one stage
#[derive(Debug, Default)]
pub struct ErrorList(Vec<(String, KubeError)>);

impl ErrorList {
    pub fn push(&mut self, action: impl Into<String>, error: KubeError) {
        self.0.push((action.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KubeError)> {
        self.0.iter().map(|(action, error)| (action.as_str(), error))
    }

    /// `Ok` when nothing was collected
    pub fn into_result(self) -> std::result::Result<(), ErrorList> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (action, error) in &self.0 {
            write!(f, "\n  - {}: {}", action, error)?;
        }
        Ok(())
    }
}

/// Failure of a feature's apply or cleanup, naming the feature and stage
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("feature '{feature}': {} precondition(s) failed:{errors}", .errors.len())]
    Precondition { feature: String, errors: ErrorList },

    #[error("feature '{feature}': {} data loader(s) failed:{errors}", .errors.len())]
    DataLoading { feature: String, errors: ErrorList },

    #[error("feature '{feature}': resource action '{action}' failed: {source}")]
    ResourceCreation {
        feature: String,
        action: String,
        #[source]
        source: KubeError,
    },

    #[error("feature '{feature}': manifest '{manifest}' ({path}) failed: {source}")]
    Manifest {
        feature: String,
        manifest: String,
        path: String,
        #[source]
        source: KubeError,
    },

    #[error("feature '{feature}': {} postcondition(s) failed:{errors}", .errors.len())]
    Postcondition { feature: String, errors: ErrorList },

    #[error("feature '{feature}': {} cleanup action(s) failed:{errors}", .errors.len())]
    Cleanup { feature: String, errors: ErrorList },
}

impl FeatureError {
    pub fn feature(&self) -> &str {
        match self {
            Self::Precondition { feature, .. }
            | Self::DataLoading { feature, .. }
            | Self::ResourceCreation { feature, .. }
            | Self::Manifest { feature, .. }
            | Self::Postcondition { feature, .. }
            | Self::Cleanup { feature, .. } => feature,
        }
    }
}

/// Failures of every feature in a set
#[derive(Debug, Error)]
#[error("{} feature(s) failed:{}", .failures.len(), render_failures(.failures))]
pub struct FeatureSetError {
    pub failures: Vec<FeatureError>,
}

fn render_failures(failures: &[FeatureError]) -> String {
    failures
        .iter()
        .map(|f| format!("\n- {}", f))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let not_found = KubeError::api_status(404, "NotFound", "secrets \"x\" not found");
        assert!(not_found.is_not_found());
        assert!(!not_found.is_already_exists());

        let exists = KubeError::api_status(409, "AlreadyExists", "already exists");
        assert!(exists.is_already_exists());
        assert!(!exists.is_not_found());

        let conflict = KubeError::api_status(409, "Conflict", "resourceVersion mismatch");
        assert!(!conflict.is_already_exists());

        assert!(!KubeError::ConditionNotMet("x".into()).is_not_found());
    }

    #[test]
    fn test_aggregated_message_lists_every_cause() {
        let mut errors = ErrorList::default();
        errors.push("crd maistra.io", KubeError::ConditionNotMet("not installed".into()));
        errors.push("namespace auth", KubeError::ConditionNotMet("forbidden".into()));

        let err = FeatureError::Precondition {
            feature: "mesh-auth".to_string(),
            errors,
        };
        let message = err.to_string();
        assert!(message.starts_with("feature 'mesh-auth': 2 precondition(s) failed:"));
        assert!(message.contains("- crd maistra.io: not installed"));
        assert!(message.contains("- namespace auth: forbidden"));
        assert_eq!(err.feature(), "mesh-auth");
    }
}
