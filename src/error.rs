//! Error types for tierload
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur while resolving or loading resources.
///
/// The type is `Clone` because a single load outcome is handed to every
/// requester that was waiting on the same in-flight attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierloadError {
    /// Name is not present in the registry
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    /// Dependency chain revisits a name already on the resolution path
    #[error("Cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// Two descriptors registered under the same name
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    /// The caller-supplied loader rejected
    #[error("Loader failed for {name}: {message}")]
    LoaderFailure { name: String, message: String },

    /// A dependency of `name` could not be loaded
    #[error("Dependency {dependency} of {name} failed: {source}")]
    DependencyFailed {
        name: String,
        dependency: String,
        #[source]
        source: Box<TierloadError>,
    },

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl TierloadError {
    /// Configuration bugs (bad registry) as opposed to runtime load failures.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            TierloadError::UnknownResource(_)
                | TierloadError::CyclicDependency(_)
                | TierloadError::DuplicateResource(_)
                | TierloadError::InvalidConfig(_)
        )
    }

    /// Walk through `DependencyFailed` wrappers to the error that started it.
    pub fn root_cause(&self) -> &TierloadError {
        match self {
            TierloadError::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised while reading a resource manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Manifest described an invalid registry
    #[error("Registry error: {0}")]
    Registry(#[from] TierloadError),
}

/// Result type alias for tierload operations
pub type Result<T> = std::result::Result<T, TierloadError>;
