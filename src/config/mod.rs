//! Configuration management for bundle-ext

pub mod config;
pub mod host;
pub mod manifest;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use config::{expand_path, Config, ConfigError, CONFIG_VERSION};
pub use host::HostConfig;
pub use manifest::ManifestConfig;
