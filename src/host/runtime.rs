//! In-process module host
//!
//! Tracks installed modules, validates state transitions and dispatches
//! lifecycle events synchronously to subscribed listeners.

use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use bundle_ext_extension::{ClassResolver, ModuleId, TypeCatalog};

use super::memory::MemoryContent;
use super::{
    LifecycleEvent, ListenerId, Module, ModuleEventKind, ModuleListener, ModuleState, Resource,
    RuntimeContext,
};

/// Identity of the system module the host installs for itself
pub const SYSTEM_MODULE: ModuleId = ModuleId(0);

/// Host errors
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("unknown module {0}")]
    UnknownModule(ModuleId),

    #[error("cannot {action} module {module} while it is {state}")]
    InvalidTransition {
        module: ModuleId,
        state: ModuleState,
        action: &'static str,
    },

    #[error("the system module cannot be modified")]
    SystemModule,

    #[error("failed to read module descriptor {path:?}: {source}")]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Resources and class scope behind a hosted module
pub trait ModuleContent: Send + Sync {
    fn find_entries(
        &self,
        directory: &str,
        pattern: &str,
        recurse: bool,
    ) -> io::Result<Vec<Box<dyn Resource>>>;

    fn class_resolver(&self) -> Arc<dyn ClassResolver>;
}

/// Events raised by a module's transitions but not yet delivered
#[derive(Default)]
struct EventQueue {
    pending: VecDeque<ModuleEventKind>,
    dispatching: bool,
}

/// A module installed in a [`ModuleHost`]
pub struct HostedModule {
    id: ModuleId,
    name: RwLock<String>,
    state: RwLock<ModuleState>,
    content: RwLock<Arc<dyn ModuleContent>>,
    /// Held for the whole of a transition, including delivery of its events
    lifecycle: ReentrantMutex<RefCell<EventQueue>>,
}

impl HostedModule {
    fn new(id: ModuleId, name: String, state: ModuleState, content: Arc<dyn ModuleContent>) -> Self {
        Self {
            id,
            name: RwLock::new(name),
            state: RwLock::new(state),
            content: RwLock::new(content),
            lifecycle: ReentrantMutex::new(RefCell::new(EventQueue::default())),
        }
    }

    fn content(&self) -> Arc<dyn ModuleContent> {
        Arc::clone(&self.content.read())
    }
}

impl Module for HostedModule {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn state(&self) -> ModuleState {
        *self.state.read()
    }

    fn find_entries(
        &self,
        directory: &str,
        pattern: &str,
        recurse: bool,
    ) -> io::Result<Vec<Box<dyn Resource>>> {
        self.content().find_entries(directory, pattern, recurse)
    }

    fn class_resolver(&self) -> Arc<dyn ClassResolver> {
        self.content().class_resolver()
    }
}

/// In-process runtime implementing [`RuntimeContext`].
///
/// Transitions of one module are serialized and their events reach every
/// listener in the order the state changed. A transition requested by a
/// listener while an event of the same module is being delivered takes effect
/// at once, but its events are delivered after the current one.
pub struct ModuleHost {
    modules: RwLock<BTreeMap<ModuleId, Arc<HostedModule>>>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ModuleListener>)>>,
    next_module: AtomicU64,
    next_listener: AtomicU64,
}

impl ModuleHost {
    /// Create a host with only the active system module installed
    pub fn new() -> Self {
        let system = Arc::new(HostedModule::new(
            SYSTEM_MODULE,
            "system".to_string(),
            ModuleState::Active,
            Arc::new(MemoryContent::new(TypeCatalog::new("system"))),
        ));

        Self {
            modules: RwLock::new(BTreeMap::from([(SYSTEM_MODULE, system)])),
            listeners: RwLock::new(Vec::new()),
            next_module: AtomicU64::new(SYSTEM_MODULE.0 + 1),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Install a module in the `Installed` state
    pub fn install(&self, name: impl Into<String>, content: impl ModuleContent + 'static) -> ModuleId {
        let id = ModuleId(self.next_module.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        debug!("Installing module {} ({})", id, name);
        let module = Arc::new(HostedModule::new(
            id,
            name,
            ModuleState::Installed,
            Arc::new(content),
        ));

        let lifecycle = module.lifecycle.lock();
        self.modules.write().insert(id, Arc::clone(&module));
        self.publish(&module, &lifecycle, ModuleEventKind::Installed);
        id
    }

    /// `Installed` -> `Resolved`
    pub fn resolve(&self, id: ModuleId) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();

        self.transition(&module, "resolve", |state| {
            (state == ModuleState::Installed).then_some(ModuleState::Resolved)
        })?;
        self.publish(&module, &lifecycle, ModuleEventKind::Resolved);
        Ok(())
    }

    /// Resolve if needed, then `Resolved` -> `Starting` -> `Active`
    pub fn start_module(&self, id: ModuleId) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();
        if module.state() == ModuleState::Installed {
            self.resolve(id)?;
        }

        self.transition(&module, "start", |state| {
            (state == ModuleState::Resolved).then_some(ModuleState::Starting)
        })?;
        self.publish(&module, &lifecycle, ModuleEventKind::Starting);

        self.set_state(&module, ModuleState::Active);
        self.publish(&module, &lifecycle, ModuleEventKind::Started);
        Ok(())
    }

    /// `Active` -> `Stopping` -> `Resolved`
    pub fn stop_module(&self, id: ModuleId) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();

        self.transition(&module, "stop", |state| {
            (state == ModuleState::Active).then_some(ModuleState::Stopping)
        })?;
        self.publish(&module, &lifecycle, ModuleEventKind::Stopping);

        self.set_state(&module, ModuleState::Resolved);
        self.publish(&module, &lifecycle, ModuleEventKind::Stopped);
        Ok(())
    }

    /// Stop if active, then `Resolved` -> `Installed`
    pub fn unresolve(&self, id: ModuleId) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();
        if module.state() == ModuleState::Active {
            self.stop_module(id)?;
        }

        self.transition(&module, "unresolve", |state| {
            (state == ModuleState::Resolved).then_some(ModuleState::Installed)
        })?;
        self.publish(&module, &lifecycle, ModuleEventKind::Unresolved);
        Ok(())
    }

    /// Refresh a module in place; a live module is unresolved and resolved again
    pub fn update(&self, id: ModuleId) -> Result<(), HostError> {
        self.refresh(id, None)
    }

    /// Replace a module's name and content. A live module is unresolved
    /// first and resolved again against the new content.
    pub fn update_with(
        &self,
        id: ModuleId,
        name: impl Into<String>,
        content: impl ModuleContent + 'static,
    ) -> Result<(), HostError> {
        let content: Arc<dyn ModuleContent> = Arc::new(content);
        self.refresh(id, Some((name.into(), content)))
    }

    /// Unresolve if live, then remove the module
    pub fn uninstall(&self, id: ModuleId) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();
        if module.state().is_live() {
            self.unresolve(id)?;
        }

        self.transition(&module, "uninstall", |state| {
            (state == ModuleState::Installed).then_some(ModuleState::Uninstalled)
        })?;
        self.modules.write().remove(&id);
        debug!("Uninstalled module {} ({})", id, module.name());
        self.publish(&module, &lifecycle, ModuleEventKind::Uninstalled);
        Ok(())
    }

    /// Look up an installed module
    pub fn module(&self, id: ModuleId) -> Option<Arc<HostedModule>> {
        self.modules.read().get(&id).cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn refresh(
        &self,
        id: ModuleId,
        replacement: Option<(String, Arc<dyn ModuleContent>)>,
    ) -> Result<(), HostError> {
        let module = self.user_module(id)?;
        let lifecycle = module.lifecycle.lock();
        let was_live = module.state().is_live();
        if was_live {
            self.unresolve(id)?;
        }

        if let Some((name, content)) = replacement {
            *module.name.write() = name;
            *module.content.write() = content;
        }
        self.publish(&module, &lifecycle, ModuleEventKind::Updated);

        if was_live {
            self.resolve(id)?;
        }
        Ok(())
    }

    fn user_module(&self, id: ModuleId) -> Result<Arc<HostedModule>, HostError> {
        if id == SYSTEM_MODULE {
            return Err(HostError::SystemModule);
        }
        self.module(id).ok_or(HostError::UnknownModule(id))
    }

    fn transition(
        &self,
        module: &HostedModule,
        action: &'static str,
        next: impl FnOnce(ModuleState) -> Option<ModuleState>,
    ) -> Result<(), HostError> {
        let mut state = module.state.write();
        match next(*state) {
            Some(target) => {
                *state = target;
                Ok(())
            }
            None => Err(HostError::InvalidTransition {
                module: module.id,
                state: *state,
                action,
            }),
        }
    }

    fn set_state(&self, module: &HostedModule, state: ModuleState) {
        *module.state.write() = state;
    }

    /// Queue an event and deliver queued events in order, unless an outer
    /// frame on this thread is already delivering for the module.
    /// Must be called with the module's lifecycle lock held.
    fn publish(
        &self,
        module: &Arc<HostedModule>,
        queue: &RefCell<EventQueue>,
        kind: ModuleEventKind,
    ) {
        {
            let mut queue = queue.borrow_mut();
            queue.pending.push_back(kind);
            if queue.dispatching {
                return;
            }
            queue.dispatching = true;
        }

        loop {
            let next = queue.borrow_mut().pending.pop_front();
            let Some(kind) = next else {
                break;
            };
            self.dispatch(kind, module);
        }
        queue.borrow_mut().dispatching = false;
    }

    fn dispatch(&self, kind: ModuleEventKind, module: &Arc<HostedModule>) {
        let listeners: Vec<Arc<dyn ModuleListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let event = LifecycleEvent::new(kind, Arc::clone(module) as Arc<dyn Module>);
        for listener in listeners {
            listener.module_changed(&event);
        }
    }
}

impl Default for ModuleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeContext for ModuleHost {
    fn own_module(&self) -> ModuleId {
        SYSTEM_MODULE
    }

    fn modules(&self) -> Vec<Arc<dyn Module>> {
        self.modules
            .read()
            .values()
            .map(|module| Arc::clone(module) as Arc<dyn Module>)
            .collect()
    }

    fn subscribe(&self, listener: Arc<dyn ModuleListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}
