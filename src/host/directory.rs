//! Filesystem-backed modules
//!
//! Every sub-directory of a modules directory is one module. An optional
//! `module.yaml` names the module and lists the classes it provides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use bundle_ext_extension::{ClassResolver, ModuleId, TypeCatalog};

use super::runtime::{HostError, ModuleContent, ModuleHost};
use super::{entry_directory, entry_pattern, Resource};

/// Module descriptor file name
pub const MODULE_DESCRIPTOR: &str = "module.yaml";

/// Contents of `module.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name, defaults to the directory name
    pub name: Option<String>,

    /// Classes resolvable through the module's own scope
    #[serde(default)]
    pub classes: Vec<String>,
}

impl ModuleDescriptor {
    /// Read the descriptor of a module directory; a missing file yields defaults
    pub fn load(module_dir: &Path) -> Result<Self, HostError> {
        let path = module_dir.join(MODULE_DESCRIPTOR);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        serde_yaml::from_str(&content).map_err(|source| HostError::Descriptor { path, source })
    }
}

/// Module content rooted at a directory
#[derive(Debug, Clone)]
pub struct DirectoryContent {
    root: PathBuf,
    catalog: Arc<TypeCatalog>,
}

impl DirectoryContent {
    pub fn new(root: impl Into<PathBuf>, catalog: TypeCatalog) -> Self {
        Self {
            root: root.into(),
            catalog: Arc::new(catalog),
        }
    }

    /// Load a module directory, returning its name and content
    pub fn load(root: &Path) -> Result<(String, Self), HostError> {
        let descriptor = ModuleDescriptor::load(root)?;
        let name = descriptor.name.unwrap_or_else(|| {
            root.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string())
        });

        let mut catalog = TypeCatalog::new(format!("module:{name}"));
        catalog.extend(descriptor.classes);
        Ok((name, Self::new(root, catalog)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModuleContent for DirectoryContent {
    fn find_entries(
        &self,
        directory: &str,
        pattern: &str,
        recurse: bool,
    ) -> io::Result<Vec<Box<dyn Resource>>> {
        let pattern = entry_pattern(pattern)?;
        let base = self.root.join(entry_directory(directory));
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let max_depth = if recurse { usize::MAX } else { 1 };
        let mut found: Vec<Box<dyn Resource>> = Vec::new();
        for entry in WalkDir::new(&base)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.file_type().is_file() && pattern.matches(&entry.file_name().to_string_lossy()) {
                found.push(Box::new(FileResource {
                    path: entry.into_path(),
                }));
            }
        }

        Ok(found)
    }

    fn class_resolver(&self) -> Arc<dyn ClassResolver> {
        self.catalog.clone()
    }
}

struct FileResource {
    path: PathBuf,
}

impl Resource for FileResource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// Changes applied by one [`DirectorySync::sync`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncChanges {
    pub installed: Vec<ModuleId>,
    pub updated: Vec<ModuleId>,
    pub uninstalled: Vec<ModuleId>,
}

impl SyncChanges {
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.updated.is_empty() && self.uninstalled.is_empty()
    }
}

/// File count and newest modification time below a module directory
type Fingerprint = (usize, Option<SystemTime>);

#[derive(Debug, Clone)]
struct Tracked {
    id: ModuleId,
    fingerprint: Fingerprint,
}

/// Mirrors a modules directory into a [`ModuleHost`]: new sub-directories are
/// installed and resolved, vanished ones uninstalled, changed ones updated.
#[derive(Debug)]
pub struct DirectorySync {
    root: PathBuf,
    known: BTreeMap<PathBuf, Tracked>,
}

impl DirectorySync {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Module installed for a directory, if any
    pub fn module_for(&self, dir: &Path) -> Option<ModuleId> {
        self.known.get(dir).map(|tracked| tracked.id)
    }

    /// Reconcile the host with the current directory contents
    pub fn sync(&mut self, host: &ModuleHost) -> Result<SyncChanges, HostError> {
        let mut changes = SyncChanges::default();
        let present = self.module_dirs()?;

        let vanished: Vec<PathBuf> = self
            .known
            .keys()
            .filter(|dir| !present.contains(dir))
            .cloned()
            .collect();
        for dir in vanished {
            if let Some(tracked) = self.known.remove(&dir) {
                info!("Module directory removed: {:?}", dir);
                host.uninstall(tracked.id)?;
                changes.uninstalled.push(tracked.id);
            }
        }

        for dir in present {
            let fingerprint = fingerprint(&dir);
            match self.known.get_mut(&dir) {
                Some(tracked) if tracked.fingerprint != fingerprint => {
                    info!("Module directory changed: {:?}", dir);
                    match DirectoryContent::load(&dir) {
                        Ok((name, content)) => {
                            tracked.fingerprint = fingerprint;
                            host.update_with(tracked.id, name, content)?;
                            changes.updated.push(tracked.id);
                        }
                        Err(e) => warn!("Keeping previous contents of {:?}: {}", dir, e),
                    }
                }
                Some(_) => {}
                None => match DirectoryContent::load(&dir) {
                    Ok((name, content)) => {
                        let id = host.install(name, content);
                        host.resolve(id)?;
                        debug!("Module directory {:?} installed as {}", dir, id);
                        self.known.insert(dir, Tracked { id, fingerprint });
                        changes.installed.push(id);
                    }
                    Err(e) => warn!("Skipping module directory {:?}: {}", dir, e),
                },
            }
        }

        Ok(changes)
    }

    fn module_dirs(&self) -> Result<Vec<PathBuf>, HostError> {
        if !self.root.is_dir() {
            warn!("Modules directory does not exist: {:?}", self.root);
            return Ok(Vec::new());
        }

        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

fn fingerprint(dir: &Path) -> Fingerprint {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, None), |(count, newest), entry| {
            let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
            (count + 1, newest.max(modified))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Module, RuntimeContext};
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_module_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let module_dir = temp_dir.path().join("payments");
        write(
            &module_dir.join(MODULE_DESCRIPTOR),
            "name: payments-core\nclasses:\n  - org.pay.GatewayImpl\n",
        );

        let (name, content) = DirectoryContent::load(&module_dir).unwrap();
        assert_eq!(name, "payments-core");
        let class = content
            .class_resolver()
            .load_class("org.pay.GatewayImpl")
            .unwrap();
        assert_eq!(class.loader(), "module:payments-core");
    }

    #[test]
    fn test_name_defaults_to_directory() {
        let temp_dir = TempDir::new().unwrap();
        let module_dir = temp_dir.path().join("audit");
        fs::create_dir_all(&module_dir).unwrap();

        let (name, _) = DirectoryContent::load(&module_dir).unwrap();
        assert_eq!(name, "audit");
    }

    #[test]
    fn test_malformed_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join(MODULE_DESCRIPTOR), "classes: {not: [a list");

        assert!(matches!(
            DirectoryContent::load(temp_dir.path()),
            Err(HostError::Descriptor { .. })
        ));
    }

    #[test]
    fn test_find_entries_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        write(&temp_dir.path().join("META-INF/cxf/bus-extensions.txt"), "a.B");
        write(&temp_dir.path().join("META-INF/cxf/sub/bus-extensions.txt"), "c.D");
        let content = DirectoryContent::new(temp_dir.path(), TypeCatalog::new("m"));

        let flat = content
            .find_entries("META-INF/cxf/", "bus-extensions.txt", false)
            .unwrap();
        assert_eq!(flat.len(), 1);

        let mut text = String::new();
        flat[0].open().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "a.B");

        let deep = content
            .find_entries("META-INF/cxf/", "bus-extensions.txt", true)
            .unwrap();
        assert_eq!(deep.len(), 2);

        assert!(content.find_entries("missing", "*", false).unwrap().is_empty());
    }

    #[test]
    fn test_sync_installs_updates_and_uninstalls() {
        let temp_dir = TempDir::new().unwrap();
        let alpha = temp_dir.path().join("alpha");
        write(&alpha.join("META-INF/cxf/bus-extensions.txt"), "a.B");

        let host = ModuleHost::new();
        let mut sync = DirectorySync::new(temp_dir.path());

        let changes = sync.sync(&host).unwrap();
        assert_eq!(changes.installed.len(), 1);
        let id = sync.module_for(&alpha).unwrap();
        assert!(host.module(id).unwrap().state().is_live());

        assert!(sync.sync(&host).unwrap().is_empty());

        write(&alpha.join("META-INF/cxf/extra.txt"), "c.D");
        assert_eq!(sync.sync(&host).unwrap().updated, vec![id]);

        fs::remove_dir_all(&alpha).unwrap();
        assert_eq!(sync.sync(&host).unwrap().uninstalled, vec![id]);
        assert_eq!(host.modules().len(), 1);
    }

    #[test]
    fn test_sync_reloads_changed_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let payments = temp_dir.path().join("payments");
        write(&payments.join(MODULE_DESCRIPTOR), "classes: []\n");

        let host = ModuleHost::new();
        let mut sync = DirectorySync::new(temp_dir.path());
        sync.sync(&host).unwrap();
        let id = sync.module_for(&payments).unwrap();
        let module = host.module(id).unwrap();
        assert!(module.class_resolver().load_class("org.pay.GatewayImpl").is_err());

        write(
            &payments.join(MODULE_DESCRIPTOR),
            "name: payments-core\nclasses:\n  - org.pay.GatewayImpl\n",
        );
        write(&payments.join("README"), "gateway");
        assert_eq!(sync.sync(&host).unwrap().updated, vec![id]);

        assert_eq!(module.name(), "payments-core");
        assert!(module.state().is_live());
        let class = module
            .class_resolver()
            .load_class("org.pay.GatewayImpl")
            .unwrap();
        assert_eq!(class.loader(), "module:payments-core");
    }

    #[test]
    fn test_sync_keeps_contents_on_broken_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let alpha = temp_dir.path().join("alpha");
        write(&alpha.join(MODULE_DESCRIPTOR), "classes:\n  - a.B\n");

        let host = ModuleHost::new();
        let mut sync = DirectorySync::new(temp_dir.path());
        sync.sync(&host).unwrap();
        let id = sync.module_for(&alpha).unwrap();

        write(&alpha.join(MODULE_DESCRIPTOR), "classes: {not: [a list");
        write(&alpha.join("README"), "x");
        assert!(sync.sync(&host).unwrap().updated.is_empty());

        let module = host.module(id).unwrap();
        assert!(module.class_resolver().load_class("a.B").is_ok());
    }

    #[test]
    fn test_sync_missing_root() {
        let host = ModuleHost::new();
        let mut sync = DirectorySync::new("/nonexistent/bundle-ext/modules");
        assert!(sync.sync(&host).unwrap().is_empty());
    }
}
