//! Module lifecycle contract consumed by the extension locator
//!
//! A hosting runtime exposes its modules through [`Module`], publishes state
//! transitions as [`LifecycleEvent`]s and lets listeners subscribe through
//! [`RuntimeContext`]. [`ModuleHost`] is the in-process implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use bundle_ext_extension::{ClassResolver, ModuleId};

pub mod directory;
pub mod memory;
pub mod runtime;

pub use directory::{DirectoryContent, DirectorySync, ModuleDescriptor, SyncChanges};
pub use memory::MemoryContent;
pub use runtime::{HostError, HostedModule, ModuleContent, ModuleHost, SYSTEM_MODULE};

/// Module states as reported by the hosting runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    Installed,
    Resolved,
    Starting,
    Active,
    Stopping,
    Uninstalled,
}

impl ModuleState {
    /// Whether the module's classes are resolvable in this state
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ModuleState::Resolved
                | ModuleState::Starting
                | ModuleState::Active
                | ModuleState::Stopping
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModuleState::Installed => "installed",
            ModuleState::Resolved => "resolved",
            ModuleState::Starting => "starting",
            ModuleState::Active => "active",
            ModuleState::Stopping => "stopping",
            ModuleState::Uninstalled => "uninstalled",
        };
        f.write_str(name)
    }
}

/// Kinds of lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleEventKind {
    Installed,
    Resolved,
    Starting,
    Started,
    Stopping,
    Stopped,
    Updated,
    Unresolved,
    Uninstalled,
}

/// Notification that a module changed state
#[derive(Clone)]
pub struct LifecycleEvent {
    pub kind: ModuleEventKind,
    pub module: Arc<dyn Module>,
    pub timestamp: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: ModuleEventKind, module: Arc<dyn Module>) -> Self {
        Self {
            kind,
            module,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvent")
            .field("kind", &self.kind)
            .field("module", &self.module.id())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// A resource a module exposes, openable as a byte stream
pub trait Resource: Send {
    /// Human-readable location, used in logs and errors
    fn location(&self) -> String;

    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A dynamically loadable unit with its own identity and class scope
pub trait Module: Send + Sync {
    fn id(&self) -> ModuleId;

    fn name(&self) -> String;

    fn state(&self) -> ModuleState;

    /// Entries under `directory` whose file name matches the glob `pattern`
    fn find_entries(
        &self,
        directory: &str,
        pattern: &str,
        recurse: bool,
    ) -> io::Result<Vec<Box<dyn Resource>>>;

    /// The module's own class-loading scope
    fn class_resolver(&self) -> Arc<dyn ClassResolver>;
}

/// Receives lifecycle events; called on the thread that caused the transition
pub trait ModuleListener: Send + Sync {
    fn module_changed(&self, event: &LifecycleEvent);
}

/// Subscription handle returned by [`RuntimeContext::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// View of the hosting runtime given to a lifecycle participant
pub trait RuntimeContext: Send + Sync {
    /// Identity of the module the participant itself lives in
    fn own_module(&self) -> ModuleId;

    /// Every module currently known to the runtime
    fn modules(&self) -> Vec<Arc<dyn Module>>;

    fn subscribe(&self, listener: Arc<dyn ModuleListener>) -> ListenerId;

    /// Returns whether the subscription existed
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

/// Compile a file-name pattern, reporting bad patterns as invalid input
pub(crate) fn entry_pattern(pattern: &str) -> io::Result<glob::Pattern> {
    glob::Pattern::new(pattern).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid entry pattern {pattern:?}: {e}"),
        )
    })
}

/// Entry directories are logical paths; leading and trailing separators are ignored
pub(crate) fn entry_directory(directory: &str) -> &str {
    directory.trim_matches('/')
}
