//! Main configuration structure and implementation

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{HostConfig, ManifestConfig};

/// Supported configuration version
pub const CONFIG_VERSION: &str = "1.0";

/// File names looked up in the working directory, in order
const DEFAULT_CONFIG_FILES: [&str; 3] = [".bundle-ext.yaml", ".bundle-ext.yml", "bundle-ext.yaml"];

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported configuration version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to expand path {path:?}: {reason}")]
    Expand { path: String, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Manifest location inside modules
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// Module host settings
    #[serde(default)]
    pub host: HostConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }

        self.manifest.validate()?;
        self.host.validate()?;

        Ok(())
    }

    /// First existing default configuration file: the working directory
    /// candidates, then `<config dir>/bundle-ext/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        Self::default_path_in(Path::new("."))
    }

    pub(crate) fn default_path_in(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .chain(dirs::config_dir().map(|dir| dir.join("bundle-ext").join("config.yaml")))
            .find(|path| path.is_file())
    }

    /// Load an explicit file, else the first default file, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => {
                debug!("Loading configuration from {:?}", path);
                Self::from_file(&path)
            }
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Modules directory with `~` and environment variables expanded
    pub fn modules_dir(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.host.modules_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            manifest: ManifestConfig::default(),
            host: HostConfig::default(),
        }
    }
}

/// Expand `~` and `$VAR` references in a path
pub fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::full(&path_str).map_err(|e| ConfigError::Expand {
        path: path_str.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
