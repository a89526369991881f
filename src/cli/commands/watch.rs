//! Watch command implementation

use crate::cli::utils;
use crate::ExtensionService;
use anyhow::Result;
use clap::{ArgMatches, Command};
use std::future::Future;
use tracing::{info, warn};

pub fn command() -> Command {
    Command::new("watch")
        .about("Track a modules directory and keep the extension registry in step until interrupted")
        .arg(utils::config_arg())
        .arg(utils::modules_dir_arg())
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let service = utils::create_service(matches)?;
    let summary = service.start()?;
    println!(
        "Watching {}: {} extensions from {} modules",
        service.modules_dir().display(),
        service.registry().len(),
        summary.contributing
    );

    watch_until(&service, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for interrupts: {}", e);
        }
    })
    .await;

    println!("Stopped.");
    Ok(())
}

/// Refresh on every poll tick until `shutdown` completes, then stop the locator
pub async fn watch_until(service: &ExtensionService, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(service.config().host.poll_interval());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, stopping");
                break;
            }
            _ = interval.tick() => {
                match service.refresh() {
                    Ok(changes) if !changes.is_empty() => {
                        println!(
                            "Modules changed: +{} ~{} -{}, {} extensions registered",
                            changes.installed.len(),
                            changes.updated.len(),
                            changes.uninstalled.len(),
                            service.registry().len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Failed to refresh modules: {}", e),
                }
            }
        }
    }

    service.stop();
}
