//! Validate command implementation

use anyhow::{anyhow, Result};
use clap::{ArgMatches, Command};
use std::path::PathBuf;
use tracing::info;

pub fn command() -> Command {
    Command::new("validate")
        .about("Check extension manifests for malformed entries")
        .arg(
            clap::Arg::new("manifests")
                .help("Manifest files to check")
                .value_name("MANIFEST")
                .required(true)
                .num_args(1..),
        )
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let manifests: Vec<PathBuf> = matches
        .get_many::<String>("manifests")
        .map(|values| values.map(PathBuf::from).collect())
        .unwrap_or_default();

    info!("Validating {} manifests", manifests.len());

    let mut invalid = 0;
    for path in &manifests {
        match crate::validate_manifest(path) {
            Ok(descriptors) => {
                println!("{}: {} extensions", path.display(), descriptors.len());
                for descriptor in &descriptors {
                    println!("  - {}", descriptor.key());
                }
            }
            Err(e) => {
                println!("{}: invalid ({})", path.display(), e);
                invalid += 1;
            }
        }
    }

    if invalid > 0 {
        return Err(anyhow!("{} of {} manifests are invalid", invalid, manifests.len()));
    }

    println!("All manifests are valid!");
    Ok(())
}
