//! Process-wide registry of active extensions
//!
//! The registry is shared through an `Arc` by every locator and by the host's
//! lookup logic. Additions are idempotent per [`ExtensionId`] and removals
//! take out exactly the given entries, so repeated batches never duplicate
//! and unrelated entries under the same key are left untouched.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::class::{ClassRef, ClassResolver};
use crate::descriptor::ExtensionKey;
use crate::extension::{Extension, ModuleId, ResolveError};

/// Registry of active extensions keyed by implementation and interface
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    entries: DashMap<ExtensionKey, Vec<Arc<Extension>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of extensions, returning how many were not yet present
    pub fn add_extensions(&self, batch: &[Arc<Extension>]) -> usize {
        let mut added = 0;

        for extension in batch {
            let mut slot = self.entries.entry(extension.key()).or_default();
            if slot.iter().any(|existing| existing.id() == extension.id()) {
                continue;
            }
            slot.push(Arc::clone(extension));
            added += 1;
        }

        debug!("Added {} of {} extensions to registry", added, batch.len());
        added
    }

    /// Remove exactly the given extensions, returning how many were present
    pub fn remove_extensions(&self, batch: &[Arc<Extension>]) -> usize {
        let mut removed = 0;

        for extension in batch {
            let key = extension.key();
            if let Some(mut slot) = self.entries.get_mut(&key) {
                let before = slot.len();
                slot.retain(|existing| existing.id() != extension.id());
                removed += before - slot.len();
            }
            self.entries.remove_if(&key, |_, slot| slot.is_empty());
        }

        debug!("Removed {} of {} extensions from registry", removed, batch.len());
        removed
    }

    /// Extensions registered under one key
    pub fn get(&self, key: &ExtensionKey) -> Vec<Arc<Extension>> {
        self.entries
            .get(key)
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }

    /// Extensions whose lookup name (interface, or implementation when no
    /// interface is declared) equals `name`
    pub fn by_name(&self, name: &str) -> Vec<Arc<Extension>> {
        let mut found: Vec<Arc<Extension>> = self
            .entries
            .iter()
            .filter(|entry| entry.key().name() == name)
            .flat_map(|entry| entry.value().clone())
            .collect();
        sort_extensions(&mut found);
        found
    }

    /// Extensions contributed by one module
    pub fn contributed_by(&self, module: ModuleId) -> Vec<Arc<Extension>> {
        let mut found: Vec<Arc<Extension>> = self
            .entries
            .iter()
            .flat_map(|entry| entry.value().clone())
            .filter(|extension| extension.module() == Some(module))
            .collect();
        sort_extensions(&mut found);
        found
    }

    /// All registered extensions ordered by key, then registration identity
    pub fn snapshot(&self) -> Vec<Arc<Extension>> {
        let mut all: Vec<Arc<Extension>> = self
            .entries
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        sort_extensions(&mut all);
        all
    }

    pub fn contains(&self, extension: &Extension) -> bool {
        self.entries
            .get(&extension.key())
            .is_some_and(|slot| slot.iter().any(|existing| existing.id() == extension.id()))
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the implementation class of every non-deferred extension.
    ///
    /// Failures of optional extensions are logged and skipped; the first
    /// failure of a required extension is returned.
    pub fn activate(&self, fallback: &dyn ClassResolver) -> Result<Vec<ClassRef>, ResolveError> {
        let mut activated = Vec::new();

        for extension in self.snapshot() {
            let descriptor = extension.descriptor();
            if descriptor.is_deferred() {
                continue;
            }

            match extension.load_class(fallback) {
                Ok(class) => activated.push(class),
                Err(e) if descriptor.is_optional() => {
                    warn!("Skipping optional extension {}: {}", extension.key(), e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(activated)
    }
}

fn sort_extensions(extensions: &mut [Arc<Extension>]) {
    extensions.sort_by(|a, b| a.key().cmp(&b.key()).then(a.id().cmp(&b.id())));
}
