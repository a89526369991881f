//! Module host settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::ConfigError;

/// Settings for the directory-backed module host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory whose sub-directories are modules
    pub modules_dir: PathBuf,

    /// How often `watch` rescans the modules directory
    pub poll_interval_ms: u64,
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            poll_interval_ms: 2000,
        }
    }
}
