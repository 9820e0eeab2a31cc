//! Error types for the activation engine.

use std::path::PathBuf;
use thiserror::Error;

use crate::ExtensionId;

/// Errors surfaced to callers of the activator and the manifest loader.
///
/// Per-extension activation failures are never returned through this type;
/// they are recorded in the registry as a [`FailureReason`].
#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("Unknown extension '{0}'")]
    UnknownExtension(ExtensionId),

    #[error("Extension '{0}' has no activation outcome")]
    Unsettled(ExtensionId),

    #[error("Activation manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("Invalid activation manifest {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Result type for activator operations.
pub type ActivationResult<T> = Result<T, ActivationError>;

/// Why an extension ended in the failed terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("depends on unknown extension '{dependency}'")]
    UnknownDependency { dependency: ExtensionId },

    #[error("dependency '{dependency}' failed to activate")]
    DependencyFailed { dependency: ExtensionId },

    #[error("activation failed: {message}")]
    ActivationFailed { message: String },

    #[error("dependency cycle or more than {max_depth} dependency levels")]
    DependencyDepthExceeded { max_depth: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_messages() {
        let reason = FailureReason::UnknownDependency {
            dependency: "missing".to_string(),
        };
        assert_eq!(reason.to_string(), "depends on unknown extension 'missing'");

        let err = ActivationError::Unsettled("a".to_string());
        assert_eq!(err.to_string(), "Extension 'a' has no activation outcome");

        let reason = FailureReason::DependencyDepthExceeded { max_depth: 10 };
        assert!(reason.to_string().contains("10 dependency levels"));
    }

    #[test]
    fn test_failure_reason_serializes_with_kind_tag() {
        let reason = FailureReason::DependencyFailed {
            dependency: "b".to_string(),
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["kind"], "dependency_failed");
        assert_eq!(json["dependency"], "b");
    }
}
