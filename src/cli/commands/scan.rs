//! Scan command implementation

use crate::cli::utils;
use crate::{ExtensionRecord, ModuleStatus, SyncSummary};
use anyhow::Result;
use clap::{ArgMatches, Command};
use serde::Serialize;
use tracing::info;

pub fn command() -> Command {
    Command::new("scan")
        .about("Discover the extensions of every module in a modules directory")
        .arg(utils::config_arg())
        .arg(utils::modules_dir_arg())
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .help("Output format")
                .value_parser(["table", "json", "yaml"])
                .default_value("table"),
        )
        .arg(
            clap::Arg::new("resolve")
                .short('r')
                .long("resolve")
                .help("Resolve eagerly activated extensions after discovery")
                .action(clap::ArgAction::SetTrue),
        )
}

#[derive(Debug, Serialize)]
struct ScanReport {
    summary: SyncSummary,
    modules: Vec<ModuleStatus>,
    extensions: Vec<ExtensionRecord>,
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let service = utils::create_service(matches)?;
    info!("Scanning modules directory {:?}", service.modules_dir());

    let summary = service.start()?;
    let report = ScanReport {
        summary,
        modules: service.modules(),
        extensions: service.records(),
    };

    let resolved = if matches.get_flag("resolve") {
        Some(service.activate())
    } else {
        None
    };
    service.stop();

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("table");
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "yaml" => print!("{}", serde_yaml::to_string(&report)?),
        _ => print_table(&report),
    }

    match resolved {
        Some(Ok(classes)) => {
            println!("\nResolved {} extension classes:", classes.len());
            for class in classes {
                println!("  - {}", class);
            }
        }
        Some(Err(e)) => return Err(e.into()),
        None => {}
    }

    Ok(())
}

fn print_table(report: &ScanReport) {
    println!("Modules:");
    if report.modules.is_empty() {
        println!("  (none)");
    }
    for module in &report.modules {
        println!(
            "  {:<6} {:<24} {:<10} {} extensions",
            module.id.to_string(),
            module.name,
            module.state.to_string(),
            module.extensions
        );
    }

    println!("\nExtensions:");
    if report.extensions.is_empty() {
        println!("  (none)");
    }
    for record in &report.extensions {
        let mut flags = Vec::new();
        if record.deferred {
            flags.push("deferred");
        }
        if record.optional {
            flags.push("optional");
        }
        println!(
            "  {:<40} {:<32} {:<16} {}",
            record.implementation,
            record.interface.as_deref().unwrap_or("-"),
            record.module_name.as_deref().unwrap_or("-"),
            flags.join(",")
        );
    }

    println!(
        "\nScanned {} modules: {} contributing, {} failed",
        report.summary.scanned, report.summary.contributing, report.summary.failed
    );
}
