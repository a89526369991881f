//! Extension model for module-sourced components
//!
//! Descriptors are parsed from text manifests, wrapped into shared [`Extension`]
//! entries and published through the process-wide [`ExtensionRegistry`].

pub mod class;
pub mod descriptor;
pub mod extension;
pub mod parser;
pub mod registry;

pub use class::{ClassNotFound, ClassRef, ClassResolver, TypeCatalog};
pub use descriptor::{DescriptorError, ExtensionDescriptor, ExtensionKey};
pub use extension::{Extension, ExtensionId, ModuleBinding, ModuleId, ResolveError};
pub use parser::{DescriptorParser, ManifestError, TextManifestParser};
pub use registry::ExtensionRegistry;
