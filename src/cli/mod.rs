//! CLI command implementations

use anyhow::Result;
use clap::{ArgMatches, Command};

pub mod commands;

/// Main CLI application
pub struct CliApp;

impl CliApp {
    /// Create the CLI application
    pub fn app() -> Command {
        Command::new("bundle-ext")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Discover and track extensions declared by dynamically loaded modules")
            .subcommand_negates_reqs(true)
            .subcommand(commands::init::command())
            .subcommand(commands::scan::command())
            .subcommand(commands::validate::command())
            .subcommand(commands::watch::command())
    }

    /// Run the CLI application
    pub async fn run(matches: &ArgMatches) -> Result<()> {
        match matches.subcommand() {
            Some(("init", sub_matches)) => commands::init::run(sub_matches).await,
            Some(("scan", sub_matches)) => commands::scan::run(sub_matches).await,
            Some(("validate", sub_matches)) => commands::validate::run(sub_matches).await,
            Some(("watch", sub_matches)) => commands::watch::run(sub_matches).await,
            _ => {
                // No subcommand provided, show help
                let _ = Self::app().print_help();
                Ok(())
            }
        }
    }
}

/// Common CLI utilities
pub mod utils {
    use anyhow::Result;
    use clap::{Arg, ArgMatches};
    use std::path::{Path, PathBuf};

    use crate::{Config, ExtensionService};

    /// Shared `--config` argument
    pub fn config_arg() -> Arg {
        Arg::new("config")
            .short('c')
            .long("config")
            .help("Configuration file path")
            .value_name("FILE")
    }

    /// Shared positional modules directory argument
    pub fn modules_dir_arg() -> Arg {
        Arg::new("modules_dir")
            .help("Modules directory, overrides the configured one")
            .value_name("MODULES_DIR")
    }

    /// Load configuration from `--config`, a default file, or defaults
    pub fn load_config(matches: &ArgMatches) -> Result<Config> {
        let path = matches.get_one::<String>("config").map(Path::new);
        Ok(Config::load(path)?)
    }

    /// Create the service, honouring a modules directory given on the command line
    pub fn create_service(matches: &ArgMatches) -> Result<ExtensionService> {
        let config = load_config(matches)?;
        let service = match matches.get_one::<String>("modules_dir") {
            Some(dir) => {
                let dir = crate::config::expand_path(&PathBuf::from(dir))?;
                ExtensionService::with_modules_dir(config, dir)?
            }
            None => ExtensionService::new(config)?,
        };
        Ok(service)
    }
}
