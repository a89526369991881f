//! Shared extension entries and module-aware class resolution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

use crate::class::{ClassRef, ClassResolver};
use crate::descriptor::{ExtensionDescriptor, ExtensionKey};

/// Identity assigned to a module by the hosting runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Process-unique identity of one [`Extension`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ExtensionId(u64);

impl ExtensionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Class resolution failure surfaced to the host's instantiation logic
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("class {name} not found{}", .module.map(|m| format!(" (module {m})")).unwrap_or_default())]
    ClassNotFound {
        name: String,
        module: Option<ModuleId>,
    },
}

/// Owning module of an extension together with that module's class scope
#[derive(Clone)]
pub struct ModuleBinding {
    module: ModuleId,
    resolver: Arc<dyn ClassResolver>,
}

impl ModuleBinding {
    pub fn new(module: ModuleId, resolver: Arc<dyn ClassResolver>) -> Self {
        Self { module, resolver }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }
}

impl fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBinding")
            .field("module", &self.module)
            .field("resolver", &self.resolver.name())
            .finish()
    }
}

/// One registry entry: a descriptor, its identity and its resolution strategy.
///
/// Resolution consults the owning module's resolver first and falls back to
/// the resolver supplied by the caller. The first successful result of each
/// path is cached; failures are not.
#[derive(Debug)]
pub struct Extension {
    id: ExtensionId,
    descriptor: ExtensionDescriptor,
    binding: Option<ModuleBinding>,
    class: OnceLock<ClassRef>,
    interface: OnceLock<ClassRef>,
}

impl Extension {
    /// Extension without an owning module
    pub fn unbound(descriptor: ExtensionDescriptor) -> Self {
        Self::with_binding(descriptor, None)
    }

    /// Extension adopted by a module
    pub fn bound(descriptor: ExtensionDescriptor, binding: ModuleBinding) -> Self {
        Self::with_binding(descriptor, Some(binding))
    }

    fn with_binding(descriptor: ExtensionDescriptor, binding: Option<ModuleBinding>) -> Self {
        Self {
            id: ExtensionId::next(),
            descriptor,
            binding,
            class: OnceLock::new(),
            interface: OnceLock::new(),
        }
    }

    pub fn id(&self) -> ExtensionId {
        self.id
    }

    pub fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    pub fn key(&self) -> ExtensionKey {
        self.descriptor.key()
    }

    /// Owning module, if the extension was discovered in one
    pub fn module(&self) -> Option<ModuleId> {
        self.binding.as_ref().map(ModuleBinding::module)
    }

    /// Implementation class, resolved once
    pub fn load_class(&self, fallback: &dyn ClassResolver) -> Result<ClassRef, ResolveError> {
        if let Some(class) = self.class.get() {
            return Ok(class.clone());
        }

        let class = self.resolve(self.descriptor.class_name(), fallback)?;
        Ok(self.class.get_or_init(|| class).clone())
    }

    /// Declared interface, resolved once; `None` when no interface is declared
    pub fn load_interface(
        &self,
        fallback: &dyn ClassResolver,
    ) -> Result<Option<ClassRef>, ResolveError> {
        let Some(interface_name) = self.descriptor.interface_name() else {
            return Ok(None);
        };
        if let Some(interface) = self.interface.get() {
            return Ok(Some(interface.clone()));
        }

        let interface = self.resolve(interface_name, fallback)?;
        Ok(Some(self.interface.get_or_init(|| interface).clone()))
    }

    /// Resolved implementation class, if a previous call cached one
    pub fn cached_class(&self) -> Option<&ClassRef> {
        self.class.get()
    }

    fn resolve(&self, name: &str, fallback: &dyn ClassResolver) -> Result<ClassRef, ResolveError> {
        if let Some(binding) = &self.binding {
            match binding.resolver.load_class(name) {
                Ok(class) => return Ok(class),
                Err(err) => trace!("{}, falling back to {}", err, fallback.name()),
            }
        }

        fallback
            .load_class(name)
            .map_err(|_| ResolveError::ClassNotFound {
                name: name.to_string(),
                module: self.module(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassNotFound, TypeCatalog};
    use std::sync::atomic::AtomicUsize;

    /// Counts lookups so caching can be observed
    struct CountingResolver {
        catalog: TypeCatalog,
        calls: AtomicUsize,
    }

    impl CountingResolver {
        fn new(catalog: TypeCatalog) -> Self {
            Self {
                catalog,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ClassResolver for CountingResolver {
        fn name(&self) -> &str {
            self.catalog.name()
        }

        fn load_class(&self, name: &str) -> Result<ClassRef, ClassNotFound> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.catalog.load_class(name)
        }
    }

    fn foo() -> ExtensionDescriptor {
        ExtensionDescriptor::new("org.x.FooImpl")
            .unwrap()
            .with_interface("org.x.Foo")
    }

    fn bound_to(catalog: TypeCatalog) -> Extension {
        Extension::bound(
            foo(),
            ModuleBinding::new(ModuleId(7), Arc::new(catalog)),
        )
    }

    #[test]
    fn test_module_resolver_preferred() {
        let ext = bound_to(
            TypeCatalog::new("module-7")
                .with_class("org.x.FooImpl")
                .with_class("org.x.Foo"),
        );
        let host = TypeCatalog::new("host")
            .with_class("org.x.FooImpl")
            .with_class("org.x.Foo");

        assert_eq!(ext.load_class(&host).unwrap().loader(), "module-7");
        assert_eq!(
            ext.load_interface(&host).unwrap().unwrap().loader(),
            "module-7"
        );
        assert_eq!(ext.module(), Some(ModuleId(7)));
    }

    #[test]
    fn test_falls_back_to_caller_resolver() {
        let ext = bound_to(TypeCatalog::new("module-7"));
        let host = TypeCatalog::new("host").with_class("org.x.FooImpl");

        assert_eq!(ext.load_class(&host).unwrap().loader(), "host");
    }

    #[test]
    fn test_failure_from_both_paths_propagates() {
        let ext = bound_to(TypeCatalog::new("module-7"));
        let err = ext.load_class(&TypeCatalog::new("host")).unwrap_err();

        assert_eq!(
            err,
            ResolveError::ClassNotFound {
                name: "org.x.FooImpl".to_string(),
                module: Some(ModuleId(7)),
            }
        );
        assert_eq!(err.to_string(), "class org.x.FooImpl not found (module #7)");
        assert!(ext.cached_class().is_none());
    }

    #[test]
    fn test_both_paths_are_cached() {
        let module = Arc::new(CountingResolver::new(
            TypeCatalog::new("module-7")
                .with_class("org.x.FooImpl")
                .with_class("org.x.Foo"),
        ));
        let ext = Extension::bound(foo(), ModuleBinding::new(ModuleId(7), module.clone()));
        let host = TypeCatalog::new("host");

        for _ in 0..3 {
            ext.load_class(&host).unwrap();
            ext.load_interface(&host).unwrap();
        }
        assert_eq!(module.calls(), 2);
    }

    #[test]
    fn test_unbound_uses_fallback_only() {
        let ext = Extension::unbound(ExtensionDescriptor::new("org.x.BarImpl").unwrap());
        let host = TypeCatalog::new("host").with_class("org.x.BarImpl");

        assert_eq!(ext.module(), None);
        assert_eq!(ext.load_class(&host).unwrap().loader(), "host");
        assert_eq!(ext.load_interface(&host).unwrap(), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Extension::unbound(foo());
        let b = Extension::unbound(foo());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.key(), b.key());
    }
}
