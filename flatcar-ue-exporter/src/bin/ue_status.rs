//! One-shot update_engine status probe.
//!
//! Subscribes to update_engine, prints the first status received and exits.
//!
//! ```bash
//! ue-status --json
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use flatcar_ue_exporter::source;

/// Print the current update_engine status
#[derive(Parser, Debug)]
#[command(name = "ue-status")]
#[command(about = "Print the current Flatcar update_engine status")]
#[command(version)]
struct Args {
    /// Seconds to wait for a status from update_engine
    #[arg(short, long, default_value = "5")]
    timeout_secs: u64,

    /// Print the status as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    flatcar_ue_common::init_logging(&args.log_level)?;

    info!("Creating update engine client");
    let source = source::connect_live()
        .await
        .context("Unable to create engine client")?;

    let (tx, mut rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { source.subscribe(tx, cancel).await }
    });

    debug!("Waiting for update on status channel");
    let received = tokio::time::timeout(Duration::from_secs(args.timeout_secs), rx.recv()).await;

    cancel.cancel();
    drop(rx);
    let subscribe_result = task.await.context("Status subscription task failed")?;

    let status = match received {
        Ok(Some(status)) => status,
        Ok(None) => {
            subscribe_result?;
            anyhow::bail!("update engine closed the status stream without a status");
        }
        Err(_) => anyhow::bail!(
            "no status from update engine within {}s",
            args.timeout_secs
        ),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status);
    }

    Ok(())
}
