//! Command-line argument parsing.

use clap::builder::BoolishValueParser;
use clap::Parser;

use flatcar_ue_common::LogFormat;

/// Flatcar update_engine exporter - Prometheus metrics for host updates
#[derive(Parser, Debug, Default)]
#[command(name = "flatcar-ue-exporter")]
#[command(about = "Prometheus exporter for the Flatcar Linux update engine")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Address to serve metrics on (`:port` listens on all interfaces)
    #[arg(short = 'l', long, env = "LISTEN_ADDRESS")]
    pub listen_address: Option<String>,

    /// Do not talk to update_engine, emit synthetic idle events instead
    #[arg(long, env = "PRETEND", value_parser = BoolishValueParser::new())]
    pub pretend: bool,

    /// Enable trace logging
    #[arg(long, env = "VERBOSE", value_parser = BoolishValueParser::new())]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long)]
    pub log_format: Option<LogFormat>,

    /// Seconds between time-in-status refreshes
    #[arg(long)]
    pub heartbeat_interval_secs: Option<u64>,
}
