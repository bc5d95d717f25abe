//! # Flatcar update_engine exporter
//!
//! Republishes the state of the Flatcar Linux `update_engine` as Prometheus
//! metrics and takes part in systemd readiness and watchdog supervision.
//!
//! ## Usage
//! ```bash
//! flatcar-ue-exporter --listen-address :26756
//! flatcar-ue-exporter --pretend --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use flatcar_ue_common::init_logging_with_format;
use flatcar_ue_exporter::cli::Args;
use flatcar_ue_exporter::config::{Config, DEFAULT_CONFIG_PATH};
use flatcar_ue_exporter::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging so the file can choose the format
    let (config, config_source) = match &args.config {
        Some(config_path) => {
            let cfg = Config::load(config_path)?.with_cli_overrides(&args);
            (cfg, Some(config_path.clone()))
        }
        None => match Config::load_optional(DEFAULT_CONFIG_PATH)? {
            Some(cfg) => (cfg.with_cli_overrides(&args), Some(DEFAULT_CONFIG_PATH.to_string())),
            None => (Config::default_with_cli(&args), None),
        },
    };

    init_logging_with_format(config.logging.format, &config.logging.level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Flatcar update_engine exporter"
    );
    match &config_source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    info!(
        listen = %config.server.listen_address,
        pretend = config.exporter.pretend,
        heartbeat_interval_secs = config.exporter.heartbeat_interval_secs,
        "Exporter configured"
    );

    if let Err(e) = server::run(config).await {
        error!(error = %e, "Application exited with error");
        return Err(e);
    }

    Ok(())
}
