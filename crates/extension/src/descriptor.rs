//! Parsed extension descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Descriptor construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("implementation class name must not be empty")]
    EmptyClassName,
}

/// Immutable description of one discoverable component
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    /// Implementation class name
    class_name: String,

    /// Declared interface name
    interface_name: Option<String>,

    /// Whether instantiation may be postponed until first lookup
    deferred: bool,

    /// Whether a resolution failure may be ignored by the host
    optional: bool,
}

impl ExtensionDescriptor {
    /// Create a descriptor for the given implementation class
    pub fn new(class_name: impl Into<String>) -> Result<Self, DescriptorError> {
        let class_name = class_name.into().trim().to_string();
        if class_name.is_empty() {
            return Err(DescriptorError::EmptyClassName);
        }

        Ok(Self {
            class_name,
            interface_name: None,
            deferred: false,
            optional: false,
        })
    }

    pub fn with_interface(mut self, interface_name: impl Into<String>) -> Self {
        let interface_name = interface_name.into().trim().to_string();
        self.interface_name = (!interface_name.is_empty()).then_some(interface_name);
        self
    }

    pub fn with_deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn interface_name(&self) -> Option<&str> {
        self.interface_name.as_deref()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Registry key of this descriptor
    pub fn key(&self) -> ExtensionKey {
        ExtensionKey {
            implementation: self.class_name.clone(),
            interface: self.interface_name.clone(),
        }
    }
}

/// Registry key derived from the implementation and interface names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtensionKey {
    pub implementation: String,
    pub interface: Option<String>,
}

impl ExtensionKey {
    /// Lookup name: the interface when one is declared, the implementation otherwise
    pub fn name(&self) -> &str {
        self.interface.as_deref().unwrap_or(&self.implementation)
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(interface) => write!(f, "{}:{}", self.implementation, interface),
            None => f.write_str(&self.implementation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_class_name_rejected() {
        assert_eq!(
            ExtensionDescriptor::new("   "),
            Err(DescriptorError::EmptyClassName)
        );
    }

    #[test]
    fn test_blank_interface_is_absent() {
        let descriptor = ExtensionDescriptor::new("org.x.FooImpl")
            .unwrap()
            .with_interface(" ");
        assert_eq!(descriptor.interface_name(), None);
        assert_eq!(descriptor.key().name(), "org.x.FooImpl");
    }

    #[test]
    fn test_key_display() {
        let key = ExtensionDescriptor::new("org.x.FooImpl")
            .unwrap()
            .with_interface("org.x.Foo")
            .key();
        assert_eq!(key.name(), "org.x.Foo");
        assert_eq!(key.to_string(), "org.x.FooImpl:org.x.Foo");
    }
}
