//! Activation manifest (`extensions.toml`)
//!
//! ```toml
//! [activator]
//! max_depth = 10
//!
//! [[extension]]
//! id = "vendor.git"
//! main = "dist/git.js"
//! dependencies = ["vendor.base"]
//! activation_events = ["onCommand:git.clone"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ActivatorConfig;
use crate::error::{ActivationError, ActivationResult};
use crate::ext_registry::ExtensionDescriptor;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivationManifest {
    #[serde(default)]
    pub activator: ActivatorConfig,
    #[serde(default, rename = "extension")]
    pub extensions: Vec<ExtensionDescriptor>,
}

impl ActivationManifest {
    /// Load and validate a manifest file.
    pub fn load(path: impl AsRef<Path>) -> ActivationResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ActivationError::ManifestNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Parse and validate manifest text.
    pub fn from_toml_str(text: &str) -> ActivationResult<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> ActivationResult<Self> {
        let manifest: Self = toml::from_str(text)?;
        manifest.validate(path)?;
        tracing::debug!(
            "Parsed activation manifest {} with {} extensions",
            path.display(),
            manifest.extensions.len()
        );
        Ok(manifest)
    }

    // Duplicate ids are left to registration, which reports them per id.
    fn validate(&self, path: &Path) -> ActivationResult<()> {
        let invalid = |message: String| ActivationError::ManifestInvalid {
            path: PathBuf::from(path),
            message,
        };

        for desc in &self.extensions {
            if desc.id.trim().is_empty() {
                return Err(invalid("extension id must not be empty".to_string()));
            }
            if desc.dependencies.iter().any(|d| d == &desc.id) {
                return Err(invalid(format!(
                    "extension '{}' lists itself as a dependency",
                    desc.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[activator]
max_depth = 6

[[extension]]
id = "vendor.base"
activation_events = ["*"]

[[extension]]
id = "vendor.git"
main = "dist/git.js"
dependencies = ["vendor.base"]
activation_events = ["onCommand:git.clone"]
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = ActivationManifest::from_toml_str(SAMPLE).unwrap();
        assert_eq!(manifest.activator.max_depth, 6);
        assert_eq!(manifest.activator.startup_events, vec!["*"]);
        assert_eq!(manifest.extensions.len(), 2);

        let git = &manifest.extensions[1];
        assert_eq!(git.id, "vendor.git");
        assert_eq!(git.main.as_deref(), Some("dist/git.js"));
        assert_eq!(git.dependencies, vec!["vendor.base"]);
        assert!(manifest.extensions[0].dependencies.is_empty());
    }

    #[test]
    fn test_empty_manifest_uses_defaults() {
        let manifest = ActivationManifest::from_toml_str("").unwrap();
        assert_eq!(manifest.activator, ActivatorConfig::default());
        assert!(manifest.extensions.is_empty());
    }

    #[test]
    fn test_rejects_self_dependency() {
        let err = ActivationManifest::from_toml_str(
            r#"
[[extension]]
id = "a"
dependencies = ["a"]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ActivationError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_rejects_empty_id() {
        let err = ActivationManifest::from_toml_str("[[extension]]\nid = \"  \"\n").unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_syntax_error() {
        let err = ActivationManifest::from_toml_str("[[extension]\nid = ").unwrap_err();
        assert!(matches!(err, ActivationError::TomlParse(_)));
    }

    #[test]
    fn test_load_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("extensions.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let manifest = ActivationManifest::load(&path).unwrap();
        assert_eq!(manifest.extensions.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ActivationManifest::load(temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ActivationError::ManifestNotFound(_)));
    }
}
