//! Text manifest parsing
//!
//! One entry per line: `implementation[:interface[:deferred[:optional]]]`.
//! Blank lines and lines starting with `#` are skipped.

use std::io::{self, Read};
use tracing::warn;

use crate::descriptor::{DescriptorError, ExtensionDescriptor};

const MAX_FIELDS: usize = 4;

/// Strict parse failures, reported with 1-based line numbers
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {source}")]
    Descriptor {
        line: usize,
        #[source]
        source: DescriptorError,
    },

    #[error("line {line}: expected at most 4 fields, found {found}")]
    TooManyFields { line: usize, found: usize },

    #[error("line {line}: invalid {field} flag {value:?}, expected true or false")]
    InvalidFlag {
        line: usize,
        field: &'static str,
        value: String,
    },
}

/// Turns manifest bytes into descriptors. Never fails: a manifest that cannot
/// be read or parsed contributes no descriptors.
pub trait DescriptorParser: Send + Sync {
    fn parse(&self, reader: &mut dyn Read) -> Vec<ExtensionDescriptor>;
}

/// Parser for the colon-separated text manifest format
#[derive(Debug, Clone, Copy, Default)]
pub struct TextManifestParser;

impl TextManifestParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a whole manifest, stopping at the first malformed entry
    pub fn try_parse(&self, reader: &mut dyn Read) -> Result<Vec<ExtensionDescriptor>, ManifestError> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        self.parse_str(&content)
    }

    /// Parse manifest text already held in memory
    pub fn parse_str(&self, content: &str) -> Result<Vec<ExtensionDescriptor>, ManifestError> {
        let mut descriptors = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            descriptors.push(parse_entry(index + 1, line)?);
        }

        Ok(descriptors)
    }
}

impl DescriptorParser for TextManifestParser {
    fn parse(&self, reader: &mut dyn Read) -> Vec<ExtensionDescriptor> {
        match self.try_parse(reader) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("Discarding extension manifest: {}", e);
                Vec::new()
            }
        }
    }
}

fn parse_entry(line: usize, entry: &str) -> Result<ExtensionDescriptor, ManifestError> {
    let fields: Vec<&str> = entry.split(':').map(str::trim).collect();
    if fields.len() > MAX_FIELDS {
        return Err(ManifestError::TooManyFields {
            line,
            found: fields.len(),
        });
    }

    let mut descriptor = ExtensionDescriptor::new(fields[0])
        .map_err(|source| ManifestError::Descriptor { line, source })?;

    if let Some(interface) = fields.get(1) {
        descriptor = descriptor.with_interface(*interface);
    }
    if let Some(value) = fields.get(2) {
        descriptor = descriptor.with_deferred(parse_flag(line, "deferred", value)?);
    }
    if let Some(value) = fields.get(3) {
        descriptor = descriptor.with_optional(parse_flag(line, "optional", value)?);
    }

    Ok(descriptor)
}

fn parse_flag(line: usize, field: &'static str, value: &str) -> Result<bool, ManifestError> {
    if value.is_empty() || value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else {
        Err(ManifestError::InvalidFlag {
            line,
            field,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MANIFEST: &str = "\
# core extensions
org.x.FooImpl:org.x.Foo

org.x.BarImpl:org.x.Bar:true
   org.x.BazImpl::false:TRUE
org.x.Standalone
";

    #[test]
    fn test_parse_manifest() {
        let descriptors = TextManifestParser::new().parse_str(MANIFEST).unwrap();
        assert_eq!(descriptors.len(), 4);

        assert_eq!(descriptors[0].class_name(), "org.x.FooImpl");
        assert_eq!(descriptors[0].interface_name(), Some("org.x.Foo"));
        assert!(!descriptors[0].is_deferred());

        assert!(descriptors[1].is_deferred());
        assert!(!descriptors[1].is_optional());

        assert_eq!(descriptors[2].interface_name(), None);
        assert!(descriptors[2].is_optional());

        assert_eq!(descriptors[3].key().name(), "org.x.Standalone");
    }

    #[test]
    fn test_empty_manifest() {
        let parser = TextManifestParser::new();
        assert!(parser.parse(&mut "".as_bytes()).is_empty());
        assert!(parser.parse(&mut "# only comments\n\n".as_bytes()).is_empty());
    }

    #[rstest]
    #[case("org.x.FooImpl:org.x.Foo\n:org.x.Bar", "line 2: implementation class name must not be empty")]
    #[case("a:b:true:false:extra", "line 1: expected at most 4 fields, found 5")]
    #[case("a:b:yes", "line 1: invalid deferred flag \"yes\", expected true or false")]
    #[case("a:b:true:1", "line 1: invalid optional flag \"1\", expected true or false")]
    fn test_malformed_entries(#[case] content: &str, #[case] message: &str) {
        let parser = TextManifestParser::new();
        let err = parser.parse_str(content).unwrap_err();
        assert_eq!(err.to_string(), message);

        // the lenient entry point drops the whole manifest
        assert!(parser.parse(&mut content.as_bytes()).is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_discarded() {
        let bytes: &[u8] = &[0x66, 0x6f, 0xff, 0xfe];
        let parser = TextManifestParser::new();

        assert!(matches!(
            parser.try_parse(&mut &bytes[..]),
            Err(ManifestError::Io(_))
        ));
        assert!(parser.parse(&mut &bytes[..]).is_empty());
    }
}
