//! CLI error types with exit code handling
//!
//! Every failure a command can end with maps to one [`CliError`] variant and
//! from there to a fixed exit code.

use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Installer spec or feature set file is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(keel::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Manifest rendering failed; `message` holds the rendered diagnostic
    #[error("{message}")]
    #[diagnostic(code(keel::cli::template))]
    Template { message: String },

    /// No cluster connection
    #[error("Cluster error: {message}")]
    #[diagnostic(
        code(keel::cli::cluster),
        help("check KUBECONFIG or the in-cluster service account")
    )]
    Cluster { message: String },

    /// Features failed to apply or clean up
    #[error("{message}")]
    #[diagnostic(code(keel::cli::feature))]
    Feature { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(keel::cli::io))]
    Io { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Template { .. } => exit_codes::TEMPLATE_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Feature { .. } => exit_codes::FEATURE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn feature(message: impl Into<String>) -> Self {
        Self::Feature {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<keel_core::CoreError> for CliError {
    fn from(err: keel_core::CoreError) -> Self {
        match err {
            keel_core::CoreError::Io(e) => e.into(),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<keel_engine::EngineError> for CliError {
    fn from(err: keel_engine::EngineError) -> Self {
        match err {
            // keep the source snippet and help of template diagnostics
            keel_engine::EngineError::Template(te) => CliError::Template {
                message: format!("{:?}", miette::Report::new(te)),
            },
            keel_engine::EngineError::Read { path, source } => CliError::Io {
                message: format!("{}: {}", path.display(), source),
            },
            other => CliError::Template {
                message: other.to_string(),
            },
        }
    }
}

impl From<keel_kube::FeatureSetError> for CliError {
    fn from(err: keel_kube::FeatureSetError) -> Self {
        CliError::feature(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::config("x").exit_code(), exit_codes::CONFIG_ERROR);
        assert_eq!(CliError::feature("x").exit_code(), exit_codes::FEATURE_ERROR);

        let io: CliError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(io.exit_code(), exit_codes::IO_ERROR);
    }

    #[test]
    fn test_core_errors_map_to_config() {
        let err: CliError = keel_core::InstallerSpec::from_yaml("applicationsNamespace: [")
            .unwrap_err()
            .into();
        assert_eq!(err.exit_code(), exit_codes::CONFIG_ERROR);
    }
}
