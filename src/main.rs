//! AWX exporter entry point.
//!
//! Reads the AWX inventory once and prints Prometheus file-based service
//! discovery targets and/or a reconciled Alertmanager configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use log::info;

mod alertmanager;
mod config;
mod inventory;
mod notifiers;
mod targets;
mod types;
mod variables;
mod walker;

use alertmanager::{reconcile, write_atomic, AlertmanagerDocument};
use config::{AlertmanagerConfig, Config};
use inventory::{AwxClient, InventorySource};
use notifiers::collect_notifiers;
use targets::{collect_probe_targets, collect_scrape_targets};

/// Exports monitoring configuration from an AWX inventory.
#[derive(clap::Parser, Debug)]
struct Args {
    /// Path to the configuration file (TOML, or JSON with a .json extension).
    #[clap(long, env = "AWX_EXPORTER_CONFIG", default_value = "config.toml")]
    config_path: PathBuf,
    /// Print Prometheus scrape targets as JSON.
    #[clap(long)]
    prometheus: bool,
    /// Print blackbox probe targets as JSON.
    #[clap(long)]
    blackbox: bool,
    /// Print the reconciled Alertmanager configuration as YAML.
    #[clap(long)]
    alertmanager: bool,
    /// Write the output to this file instead of stdout. Requires exactly one mode.
    #[clap(long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let modes = [args.prometheus, args.blackbox, args.alertmanager]
        .iter()
        .filter(|m| **m)
        .count();
    if modes == 0 {
        bail!("Select at least one of --prometheus, --blackbox or --alertmanager");
    }
    if args.output.is_some() && modes > 1 {
        bail!("--output can only be used with a single mode");
    }

    // Load configuration
    let cfg = Config::load(&args.config_path).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            args.config_path.display()
        )
    })?;
    info!("Starting AWX exporter with config: {:?}", cfg);

    let client = AwxClient::new(&cfg.awx).context("Failed to create the AWX client")?;

    if args.prometheus {
        let targets = collect_scrape_targets(&client, &cfg.prometheus)
            .await
            .context("Failed to collect Prometheus targets")?;
        emit(args.output.as_deref(), &serde_json::to_string(&targets)?)?;
    }

    if args.blackbox {
        let targets = collect_probe_targets(&client, &cfg.blackbox)
            .await
            .context("Failed to collect blackbox targets")?;
        emit(args.output.as_deref(), &serde_json::to_string(&targets)?)?;
    }

    if args.alertmanager {
        let rendered = alertmanager_config(&client, &cfg.alertmanager).await?;
        emit(args.output.as_deref(), &rendered)?;
    }

    info!("Done.");
    Ok(())
}

/// Loads the Alertmanager file, reconciles it with the inventory and
/// renders the result. Nothing is written here.
async fn alertmanager_config(
    source: &dyn InventorySource,
    config: &AlertmanagerConfig,
) -> anyhow::Result<String> {
    let mut document = AlertmanagerDocument::load(&config.source_file)
        .context("Failed to load the Alertmanager configuration")?;
    let notifiers = collect_notifiers(source, config)
        .await
        .context("Failed to collect Alertmanager notifiers")?;
    reconcile(&mut document, &notifiers, &config.managed_prefix)
        .context("Failed to reconcile the Alertmanager configuration")?;
    document
        .to_yaml()
        .context("Failed to render the Alertmanager configuration")
}

fn emit(output: Option<&Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            write_atomic(path, content)?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
