//! Manifest location settings

use serde::{Deserialize, Serialize};

use crate::locator::ManifestLocation;

use super::ConfigError;

/// Where modules keep their extension manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Logical directory inside each module
    pub directory: String,

    /// Manifest file-name glob
    pub file_pattern: String,

    /// Search sub-directories of `directory` too
    pub recursive: bool,
}

impl ManifestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid(
                "manifest directory must not be empty".to_string(),
            ));
        }

        glob::Pattern::new(&self.file_pattern).map_err(|e| {
            ConfigError::Invalid(format!(
                "invalid manifest file pattern {:?}: {}",
                self.file_pattern, e
            ))
        })?;

        Ok(())
    }

    pub fn location(&self) -> ManifestLocation {
        ManifestLocation {
            directory: self.directory.clone(),
            pattern: self.file_pattern.clone(),
            recurse: self.recursive,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        let location = ManifestLocation::default();
        Self {
            directory: location.directory,
            file_pattern: location.pattern,
            recursive: location.recurse,
        }
    }
}
