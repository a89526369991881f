//! In-memory module content

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use bundle_ext_extension::{ClassResolver, TypeCatalog};

use super::runtime::ModuleContent;
use super::{entry_directory, entry_pattern, Resource};

#[derive(Debug, Clone)]
enum Entry {
    Bytes(Arc<[u8]>),
    Unreadable(String),
}

/// Module content held in memory: named entries plus a class catalog
#[derive(Debug, Clone)]
pub struct MemoryContent {
    catalog: Arc<TypeCatalog>,
    entries: BTreeMap<String, Entry>,
    lookup_failure: Option<String>,
}

impl MemoryContent {
    pub fn new(catalog: TypeCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            entries: BTreeMap::new(),
            lookup_failure: None,
        }
    }

    /// Add an entry at a `/`-separated path
    pub fn with_entry(mut self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.entries.insert(
            entry_directory(path).to_string(),
            Entry::Bytes(Arc::from(content.as_ref())),
        );
        self
    }

    /// Add an entry that is listed but fails to open
    pub fn with_unreadable_entry(mut self, path: &str, reason: impl Into<String>) -> Self {
        self.entries.insert(
            entry_directory(path).to_string(),
            Entry::Unreadable(reason.into()),
        );
        self
    }

    /// Make every entry lookup fail
    pub fn with_lookup_failure(mut self, reason: impl Into<String>) -> Self {
        self.lookup_failure = Some(reason.into());
        self
    }
}

impl ModuleContent for MemoryContent {
    fn find_entries(
        &self,
        directory: &str,
        pattern: &str,
        recurse: bool,
    ) -> io::Result<Vec<Box<dyn Resource>>> {
        if let Some(reason) = &self.lookup_failure {
            return Err(io::Error::new(io::ErrorKind::Other, reason.clone()));
        }

        let pattern = entry_pattern(pattern)?;
        let directory = entry_directory(directory);

        let found = self
            .entries
            .iter()
            .filter(|(path, _)| {
                let (parent, file_name) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
                let in_scope = if recurse {
                    directory.is_empty()
                        || parent == directory
                        || parent.starts_with(&format!("{directory}/"))
                } else {
                    parent == directory
                };
                in_scope && pattern.matches(file_name)
            })
            .map(|(path, entry)| {
                Box::new(MemoryResource {
                    path: path.clone(),
                    entry: entry.clone(),
                }) as Box<dyn Resource>
            })
            .collect();

        Ok(found)
    }

    fn class_resolver(&self) -> Arc<dyn ClassResolver> {
        self.catalog.clone()
    }
}

struct MemoryResource {
    path: String,
    entry: Entry,
}

impl Resource for MemoryResource {
    fn location(&self) -> String {
        format!("memory:/{}", self.path)
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match &self.entry {
            Entry::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            Entry::Unreadable(reason) => Err(io::Error::new(io::ErrorKind::Other, reason.clone())),
        }
    }
}
