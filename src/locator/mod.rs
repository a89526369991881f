//! Lifecycle-driven extension discovery
//!
//! The [`ExtensionLocator`] listens to module lifecycle events. When a module
//! resolves, its extension manifests are parsed and the descriptors are
//! published to the shared [`ExtensionRegistry`]; when it unresolves or is
//! uninstalled, everything it contributed is withdrawn again.
//!
//! Failures on the event path are logged and absorbed: a module whose
//! manifests cannot be read simply contributes fewer extensions.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tracing::{debug, info, warn};

use bundle_ext_extension::{
    DescriptorParser, Extension, ExtensionRegistry, ModuleBinding, ModuleId, TextManifestParser,
};

use crate::host::{
    LifecycleEvent, ListenerId, Module, ModuleEventKind, ModuleListener, RuntimeContext,
};

pub mod module_set;


pub use module_set::ModuleExtensions;

/// Where a module keeps its extension manifests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLocation {
    /// Logical directory inside the module
    pub directory: String,

    /// File-name glob pattern
    pub pattern: String,

    /// Whether sub-directories are searched too
    pub recurse: bool,
}

impl Default for ManifestLocation {
    fn default() -> Self {
        Self {
            directory: "META-INF/cxf/".to_string(),
            pattern: "bus-extensions.txt".to_string(),
            recurse: false,
        }
    }
}

/// A manifest that could not be opened
#[derive(Debug)]
pub struct ResourceFailure {
    pub location: String,
    pub source: io::Error,
}

fn describe(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.location, failure.source))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Discovery errors, surfaced only to direct callers of [`ExtensionLocator::register`]
#[derive(Debug, thiserror::Error)]
pub enum LocatorError {
    #[error("failed to look up extension manifests of module {module}: {source}")]
    Lookup {
        module: ModuleId,
        #[source]
        source: io::Error,
    },

    #[error("extension manifests of module {module} could not be read: {}", describe(.failures))]
    Discovery {
        module: ModuleId,
        failures: Vec<ResourceFailure>,
    },
}

/// Outcome of the initial synchronization pass in [`ExtensionLocator::start`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Live modules examined
    pub scanned: usize,

    /// Modules that contributed at least one extension
    pub contributing: usize,

    /// Modules with at least one failed manifest
    pub failed: usize,
}

/// Keeps the extension registry consistent with the live modules of a runtime
pub struct ExtensionLocator {
    registry: Arc<ExtensionRegistry>,
    parser: Arc<dyn DescriptorParser>,
    location: ManifestLocation,
    extensions: DashMap<ModuleId, Arc<ModuleExtensions>>,
    own_module: RwLock<Option<ModuleId>>,
    subscription: Mutex<Option<ListenerId>>,
}

impl ExtensionLocator {
    pub fn new(registry: Arc<ExtensionRegistry>) -> Self {
        Self {
            registry,
            parser: Arc::new(TextManifestParser::new()),
            location: ManifestLocation::default(),
            extensions: DashMap::new(),
            own_module: RwLock::new(None),
            subscription: Mutex::new(None),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DescriptorParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_manifest_location(mut self, location: ManifestLocation) -> Self {
        self.location = location;
        self
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    pub fn manifest_location(&self) -> &ManifestLocation {
        &self.location
    }

    /// Subscribe to lifecycle events, then register every live module
    /// except the locator's own. Per-module failures are logged and counted.
    pub fn start(self: &Arc<Self>, context: &dyn RuntimeContext) -> SyncSummary {
        let own = context.own_module();
        *self.own_module.write() = Some(own);

        let listener: Arc<dyn ModuleListener> = Arc::clone(self) as Arc<dyn ModuleListener>;
        let subscription = context.subscribe(listener);
        if let Some(previous) = self.subscription.lock().replace(subscription) {
            context.unsubscribe(previous);
        }

        let mut summary = SyncSummary::default();
        for module in context.modules() {
            let id = module.id();
            if id == own || !module.state().is_live() {
                continue;
            }

            summary.scanned += 1;
            if let Err(e) = self.register(module.as_ref()) {
                warn!("Extension discovery failed for module {}: {}", id, e);
                summary.failed += 1;
            }
            if self.extensions.contains_key(&id) {
                summary.contributing += 1;
            }
        }

        info!(
            "Extension locator started: {} modules scanned, {} contributing, {} failed",
            summary.scanned, summary.contributing, summary.failed
        );
        summary
    }

    /// Unsubscribe, then withdraw every module's extensions until none remain.
    ///
    /// A `register` already running on another thread when `stop` starts may
    /// still publish after the drain; such a late registration is accepted.
    /// The own module stays excluded until the next `start`.
    pub fn stop(&self, context: &dyn RuntimeContext) {
        if let Some(subscription) = self.subscription.lock().take() {
            context.unsubscribe(subscription);
        }

        let mut drained = 0;
        loop {
            let next = self.extensions.iter().next().map(|entry| *entry.key());
            let Some(module) = next else {
                break;
            };
            self.unregister(module);
            drained += 1;
        }

        info!("Extension locator stopped: {} modules unregistered", drained);
    }

    pub fn is_started(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Discover a module's extensions and publish them.
    ///
    /// Each manifest is processed on its own: one that cannot be opened is
    /// skipped and the others still contribute. The skipped manifests are
    /// reported afterwards as [`LocatorError::Discovery`]. Returns the number
    /// of extensions newly added to the module's set.
    pub fn register(&self, module: &dyn Module) -> Result<usize, LocatorError> {
        let id = module.id();
        let resources = module
            .find_entries(
                &self.location.directory,
                &self.location.pattern,
                self.location.recurse,
            )
            .map_err(|source| LocatorError::Lookup { module: id, source })?;

        let mut contributed = 0;
        let mut failures = Vec::new();

        for resource in resources {
            let descriptors = match resource.open() {
                Ok(mut reader) => self.parser.parse(&mut reader),
                Err(source) => {
                    debug!("Cannot open {}: {}", resource.location(), source);
                    failures.push(ResourceFailure {
                        location: resource.location(),
                        source,
                    });
                    continue;
                }
            };
            if descriptors.is_empty() {
                continue;
            }

            let resolver = module.class_resolver();
            let batch: Vec<Arc<Extension>> = descriptors
                .into_iter()
                .map(|descriptor| {
                    Arc::new(Extension::bound(
                        descriptor,
                        ModuleBinding::new(id, Arc::clone(&resolver)),
                    ))
                })
                .collect();

            // a set is only ever mapped once it holds descriptors
            let (set, added) = match self.extensions.entry(id) {
                Entry::Occupied(entry) => {
                    let set = Arc::clone(entry.get());
                    drop(entry);
                    let added = set.append(&batch);
                    (set, added)
                }
                Entry::Vacant(entry) => {
                    let set = Arc::new(ModuleExtensions::with_entries(id, &batch));
                    let added = set.len();
                    entry.insert(Arc::clone(&set));
                    (set, added)
                }
            };

            contributed += added;
            self.publish(&set);
            debug!(
                "Module {} manifest {}: {} extensions now registered",
                id,
                resource.location(),
                set.len()
            );
        }

        if failures.is_empty() {
            Ok(contributed)
        } else {
            Err(LocatorError::Discovery {
                module: id,
                failures,
            })
        }
    }

    /// Withdraw a module's extensions; returns how many left the registry
    pub fn unregister(&self, module: ModuleId) -> usize {
        let Some((_, set)) = self.extensions.remove(&module) else {
            return 0;
        };

        let removed = self.registry.remove_extensions(&set.snapshot());
        debug!("Module {}: {} extensions unregistered", module, removed);
        removed
    }

    /// Modules that currently contribute extensions
    pub fn modules(&self) -> Vec<ModuleId> {
        let mut modules: Vec<ModuleId> = self.extensions.iter().map(|entry| *entry.key()).collect();
        modules.sort();
        modules
    }

    pub fn module_set(&self, module: ModuleId) -> Option<Arc<ModuleExtensions>> {
        self.extensions.get(&module).map(|entry| entry.value().clone())
    }

    pub fn extensions_of(&self, module: ModuleId) -> Vec<Arc<Extension>> {
        self.module_set(module)
            .map(|set| set.snapshot().as_ref().clone())
            .unwrap_or_default()
    }

    /// Bulk-add the whole current set, withdrawing it again if a concurrent
    /// unregister retired the set in the meantime.
    fn publish(&self, set: &Arc<ModuleExtensions>) {
        let snapshot = set.snapshot();
        self.registry.add_extensions(&snapshot);

        let still_mapped = self
            .extensions
            .get(&set.module())
            .is_some_and(|current| Arc::ptr_eq(current.value(), set));
        if !still_mapped {
            debug!("Module {} unregistered during discovery", set.module());
            self.registry.remove_extensions(&snapshot);
        }
    }

    fn is_own(&self, module: ModuleId) -> bool {
        *self.own_module.read() == Some(module)
    }
}

impl ModuleListener for ExtensionLocator {
    fn module_changed(&self, event: &LifecycleEvent) {
        let id = event.module.id();
        if self.is_own(id) {
            return;
        }

        match event.kind {
            ModuleEventKind::Resolved => {
                if let Err(e) = self.register(event.module.as_ref()) {
                    warn!("Ignoring extension discovery failure for module {}: {}", id, e);
                }
            }
            ModuleEventKind::Unresolved | ModuleEventKind::Uninstalled => {
                self.unregister(id);
            }
            _ => {}
        }
    }
}
