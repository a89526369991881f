//! Per-module extension sets

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use bundle_ext_extension::{Extension, ModuleId};

/// Extensions discovered in one module.
///
/// Appends publish a new copy of the sequence, so a snapshot taken for a bulk
/// registry update never observes a partially applied append.
#[derive(Debug)]
pub struct ModuleExtensions {
    module: ModuleId,
    discovered_at: DateTime<Utc>,
    entries: ArcSwap<Vec<Arc<Extension>>>,
}

impl ModuleExtensions {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            discovered_at: Utc::now(),
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// A set already holding `batch`, deduplicated by descriptor
    pub fn with_entries(module: ModuleId, batch: &[Arc<Extension>]) -> Self {
        let set = Self::new(module);
        set.append(batch);
        set
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// When the first descriptor of this module was discovered
    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// Append a batch, skipping descriptors the set already holds.
    /// Returns how many entries were appended.
    pub fn append(&self, batch: &[Arc<Extension>]) -> usize {
        let mut appended = 0;

        self.entries.rcu(|current| {
            let mut next = Vec::clone(current);
            let before = next.len();
            for extension in batch {
                if !next
                    .iter()
                    .any(|existing| existing.descriptor() == extension.descriptor())
                {
                    next.push(Arc::clone(extension));
                }
            }
            appended = next.len() - before;
            next
        });

        appended
    }

    /// Current contents
    pub fn snapshot(&self) -> Arc<Vec<Arc<Extension>>> {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}
