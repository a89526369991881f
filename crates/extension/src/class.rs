//! Class resolution strategies

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Handle to a resolved implementation or interface type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassRef {
    name: Arc<str>,
    loader: Arc<str>,
}

impl ClassRef {
    pub fn new(name: impl Into<Arc<str>>, loader: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            loader: loader.into(),
        }
    }

    /// Fully qualified class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the resolver that produced this handle
    pub fn loader(&self) -> &str {
        &self.loader
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.loader)
    }
}

/// Raised by a single resolver that does not know a class
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("class {name} not found by {loader}")]
pub struct ClassNotFound {
    pub name: String,
    pub loader: String,
}

/// A class-loading scope: a module's own scope or the host's generic one
pub trait ClassResolver: Send + Sync {
    /// Resolver name, reported on the handles it produces
    fn name(&self) -> &str;

    /// Resolve a class by its fully qualified name
    fn load_class(&self, name: &str) -> Result<ClassRef, ClassNotFound>;
}

/// Resolver backed by a fixed set of known class names
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    name: String,
    classes: BTreeSet<String>,
}

impl TypeCatalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: BTreeSet::new(),
        }
    }

    /// Builder-style variant of [`TypeCatalog::insert`]
    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.insert(class_name);
        self
    }

    pub fn insert(&mut self, class_name: impl Into<String>) {
        self.classes.insert(class_name.into());
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.contains(class_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl<S: Into<String>> Extend<S> for TypeCatalog {
    fn extend<T: IntoIterator<Item = S>>(&mut self, iter: T) {
        for class_name in iter {
            self.insert(class_name);
        }
    }
}

impl ClassResolver for TypeCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_class(&self, name: &str) -> Result<ClassRef, ClassNotFound> {
        if self.classes.contains(name) {
            Ok(ClassRef::new(name, self.name.as_str()))
        } else {
            Err(ClassNotFound {
                name: name.to_string(),
                loader: self.name.clone(),
            })
        }
    }
}
