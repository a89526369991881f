use bundle_ext::cli::CliApp;
use bundle_ext::Config;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_cli_definition() {
    CliApp::app().debug_assert();
}

#[test]
fn test_scan_arguments() {
    let matches = CliApp::app()
        .try_get_matches_from(["bundle-ext", "scan", "/srv/modules", "--format", "json", "--resolve"])
        .unwrap();
    let (name, scan) = matches.subcommand().unwrap();

    assert_eq!(name, "scan");
    assert_eq!(scan.get_one::<String>("modules_dir").unwrap(), "/srv/modules");
    assert_eq!(scan.get_one::<String>("format").unwrap(), "json");
    assert!(scan.get_flag("resolve"));

    assert!(CliApp::app()
        .try_get_matches_from(["bundle-ext", "scan", "--format", "xml"])
        .is_err());
}

#[test]
fn test_validate_requires_manifest() {
    assert!(CliApp::app()
        .try_get_matches_from(["bundle-ext", "validate"])
        .is_err());
}

#[tokio::test]
async fn test_init_writes_default_config() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("bundle-ext.yaml");
    let output_arg = output.to_string_lossy().to_string();

    let matches = CliApp::app()
        .try_get_matches_from(["bundle-ext", "init", "--output", output_arg.as_str()])
        .unwrap();
    CliApp::run(&matches).await.unwrap();

    let config = Config::from_file(&output).unwrap();
    assert_eq!(config, Config::default());

    // a second init without --force refuses to overwrite
    assert!(CliApp::run(&matches).await.is_err());

    let forced = CliApp::app()
        .try_get_matches_from(["bundle-ext", "init", "--output", output_arg.as_str(), "--force"])
        .unwrap();
    CliApp::run(&forced).await.unwrap();
}

#[tokio::test]
async fn test_validate_command_fails_on_invalid_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let good = temp_dir.path().join("good.txt");
    let bad = temp_dir.path().join("bad.txt");
    fs::write(&good, "org.x.FooImpl:org.x.Foo\n").unwrap();
    fs::write(&bad, "a:b:c:d:e\n").unwrap();
    let (good, bad) = (good.to_string_lossy().to_string(), bad.to_string_lossy().to_string());

    let matches = CliApp::app()
        .try_get_matches_from(["bundle-ext", "validate", good.as_str()])
        .unwrap();
    CliApp::run(&matches).await.unwrap();

    let matches = CliApp::app()
        .try_get_matches_from(["bundle-ext", "validate", good.as_str(), bad.as_str()])
        .unwrap();
    let err = CliApp::run(&matches).await.unwrap_err();
    assert_eq!(err.to_string(), "1 of 2 manifests are invalid");
}

#[tokio::test]
async fn test_scan_command_over_directory() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = temp_dir.path().join("m1/META-INF/cxf/bus-extensions.txt");
    fs::create_dir_all(manifest.parent().unwrap()).unwrap();
    fs::write(&manifest, "org.x.FooImpl:org.x.Foo\n").unwrap();
    let dir = temp_dir.path().to_string_lossy().to_string();

    let matches = CliApp::app()
        .try_get_matches_from(["bundle-ext", "scan", dir.as_str(), "--format", "yaml"])
        .unwrap();
    CliApp::run(&matches).await.unwrap();
}
