//! Configuration tests

use super::*;
use rstest::rstest;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(config, parsed);
}

#[test]
fn test_config_from_file() {
    let mut config = Config::default();
    config.manifest.recursive = true;
    config.host.modules_dir = PathBuf::from("/srv/modules");

    let temp_file = NamedTempFile::new().unwrap();
    config.save_to_file(temp_file.path()).unwrap();

    let loaded = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config, loaded);
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), "version: \"1.0\"\nhost:\n  poll_interval_ms: 250\n").unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(config.manifest, ManifestConfig::default());
    assert_eq!(config.host.modules_dir, PathBuf::from("modules"));
    assert_eq!(config.host.poll_interval().as_millis(), 250);
}

#[test]
fn test_default_config_is_valid() {
    assert!(Config::default().validate().is_ok());

    let mut config = Config::default();
    config.version = "2.0".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::UnsupportedVersion(v)) if v == "2.0"
    ));
}

#[rstest]
#[case::root_directory(|c: &mut Config| c.manifest.directory = "/".to_string())]
#[case::empty_directory(|c: &mut Config| c.manifest.directory = String::new())]
#[case::bad_pattern(|c: &mut Config| c.manifest.file_pattern = "[".to_string())]
#[case::zero_interval(|c: &mut Config| c.host.poll_interval_ms = 0)]
fn test_invalid_config(#[case] mutate: fn(&mut Config)) {
    let mut config = Config::default();
    mutate(&mut config);
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_manifest_location() {
    let location = ManifestConfig::default().location();
    assert_eq!(location.directory, "META-INF/cxf/");
    assert_eq!(location.pattern, "bus-extensions.txt");
    assert!(!location.recurse);
}

#[test]
fn test_default_path_lookup_order() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("bundle-ext.yaml"), "version: \"1.0\"\n").unwrap();
    std::fs::write(temp_dir.path().join(".bundle-ext.yml"), "version: \"1.0\"\n").unwrap();

    let found = Config::default_path_in(temp_dir.path()).unwrap();
    assert_eq!(found, temp_dir.path().join(".bundle-ext.yml"));
}

#[test]
fn test_load_explicit_missing_file() {
    let result = Config::load(Some(Path::new("/nonexistent/bundle-ext.yaml")));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_expand_path() {
    std::env::set_var("BUNDLE_EXT_TEST_ROOT", "/opt/bundles");
    let expanded = expand_path(Path::new("$BUNDLE_EXT_TEST_ROOT/modules")).unwrap();
    assert_eq!(expanded, PathBuf::from("/opt/bundles/modules"));

    assert_eq!(
        expand_path(Path::new("plain/dir")).unwrap(),
        PathBuf::from("plain/dir")
    );
    assert!(expand_path(Path::new("$BUNDLE_EXT_TEST_UNSET_VAR/x")).is_err());
}
