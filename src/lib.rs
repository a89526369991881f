//! Bundle extension locator
//!
//! Tracks extensions declared by dynamically loaded modules and keeps a
//! shared extension registry consistent with the modules' lifecycle.
//! Modules publish `META-INF/cxf/bus-extensions.txt` manifests; when a module
//! resolves its extensions are registered, when it goes away they are withdrawn.

pub mod cli;
pub mod config;
pub mod host;
pub mod locator;

pub use bundle_ext_extension::{
    ClassRef, ClassResolver, Extension, ExtensionDescriptor, ExtensionKey, ExtensionRegistry,
    ManifestError, ModuleId, ResolveError, TextManifestParser, TypeCatalog,
};
pub use config::{Config, ConfigError};
pub use host::{DirectorySync, HostError, ModuleHost, SyncChanges};
pub use locator::{ExtensionLocator, LocatorError, ManifestLocation, SyncSummary};

use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use host::{Module, ModuleState, RuntimeContext, SYSTEM_MODULE};

/// Application error types
#[derive(thiserror::Error, Debug)]
pub enum BundleExtError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Module host error: {0}")]
    Host(#[from] HostError),

    #[error("Extension discovery failed: {0}")]
    Locator(#[from] LocatorError),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Extension activation failed: {0}")]
    Resolve(#[from] ResolveError),
}

/// Result type for the main application
pub type BundleExtResult<T> = Result<T, BundleExtError>;

/// One registered extension, flattened for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionRecord {
    pub module: Option<ModuleId>,
    pub module_name: Option<String>,
    pub implementation: String,
    pub interface: Option<String>,
    pub deferred: bool,
    pub optional: bool,
}

/// Per-module status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    pub id: ModuleId,
    pub name: String,
    pub state: ModuleState,
    pub extensions: usize,
}

/// Main application context: a directory-backed module host with a locator
/// keeping the registry in step with it
pub struct ExtensionService {
    config: Config,
    host: Arc<ModuleHost>,
    registry: Arc<ExtensionRegistry>,
    locator: Arc<ExtensionLocator>,
    sync: Mutex<DirectorySync>,
}

impl ExtensionService {
    /// Create a service over the configured modules directory
    pub fn new(config: Config) -> BundleExtResult<Self> {
        let modules_dir = config.modules_dir()?;
        Self::with_modules_dir(config, modules_dir)
    }

    /// Create a service over an explicit modules directory
    pub fn with_modules_dir(config: Config, modules_dir: impl Into<PathBuf>) -> BundleExtResult<Self> {
        config.validate()?;

        let registry = Arc::new(ExtensionRegistry::new());
        let locator = Arc::new(
            ExtensionLocator::new(Arc::clone(&registry))
                .with_manifest_location(config.manifest.location()),
        );

        Ok(Self {
            config,
            host: Arc::new(ModuleHost::new()),
            registry,
            locator,
            sync: Mutex::new(DirectorySync::new(modules_dir)),
        })
    }

    /// Install the modules currently on disk, then start the locator
    pub fn start(&self) -> BundleExtResult<SyncSummary> {
        let changes = self.sync.lock().sync(&self.host)?;
        info!(
            "Installed {} modules from {:?}",
            changes.installed.len(),
            self.modules_dir()
        );

        Ok(self.locator.start(self.host.as_ref()))
    }

    /// Apply changes on disk since the last pass
    pub fn refresh(&self) -> BundleExtResult<SyncChanges> {
        let changes = self.sync.lock().sync(&self.host)?;
        if !changes.is_empty() {
            info!(
                "Modules changed: {} installed, {} updated, {} uninstalled",
                changes.installed.len(),
                changes.updated.len(),
                changes.uninstalled.len()
            );
        }
        Ok(changes)
    }

    pub fn stop(&self) {
        self.locator.stop(self.host.as_ref());
    }

    /// Resolve every eagerly activated extension against the module scopes,
    /// falling back to the system module
    pub fn activate(&self) -> BundleExtResult<Vec<ClassRef>> {
        let fallback = self
            .host
            .module(SYSTEM_MODULE)
            .map(|system| system.class_resolver())
            .unwrap_or_else(|| Arc::new(TypeCatalog::new("system")) as Arc<dyn ClassResolver>);

        Ok(self.registry.activate(fallback.as_ref())?)
    }

    /// Every registered extension in registry order
    pub fn records(&self) -> Vec<ExtensionRecord> {
        self.registry
            .snapshot()
            .iter()
            .map(|extension| {
                let descriptor = extension.descriptor();
                let module = extension.module();
                ExtensionRecord {
                    module,
                    module_name: module
                        .and_then(|id| self.host.module(id))
                        .map(|m| m.name().to_string()),
                    implementation: descriptor.class_name().to_string(),
                    interface: descriptor.interface_name().map(str::to_string),
                    deferred: descriptor.is_deferred(),
                    optional: descriptor.is_optional(),
                }
            })
            .collect()
    }

    /// Installed modules other than the system module
    pub fn modules(&self) -> Vec<ModuleStatus> {
        self.host
            .modules()
            .into_iter()
            .filter(|module| module.id() != SYSTEM_MODULE)
            .map(|module| ModuleStatus {
                id: module.id(),
                name: module.name().to_string(),
                state: module.state(),
                extensions: self.registry.contributed_by(module.id()).len(),
            })
            .collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.sync.lock().root().to_path_buf()
    }

    pub fn host(&self) -> &Arc<ModuleHost> {
        &self.host
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn locator(&self) -> &Arc<ExtensionLocator> {
        &self.locator
    }
}

/// Strict-parse one manifest file
pub fn validate_manifest(path: &Path) -> BundleExtResult<Vec<ExtensionDescriptor>> {
    let mut file = std::fs::File::open(path).map_err(ManifestError::Io)?;
    Ok(TextManifestParser::new().try_parse(&mut file)?)
}
