//! Exporter process wiring.
//!
//! Binds the listener, picks the status source, installs the signal
//! listener, and runs the HTTP server next to the lifecycle coordinator.
//! Any startup failure returns before a worker is spawned.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::aggregator::StatusAggregator;
use crate::config::Config;
use crate::http_server::{run_http_server, AppState};
use crate::lifecycle::Coordinator;
use crate::metrics::ExporterMetrics;
use crate::source::{self, PretendSource, StatusSource};
use crate::supervisor::SupervisorNotifier;

/// Run the exporter until SIGTERM/SIGINT or a fatal source failure.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    let metrics = ExporterMetrics::new().context("Failed to register metrics")?;
    let aggregator = Arc::new(StatusAggregator::new(metrics));

    let listen_addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind metrics listener on {}", listen_addr))?;

    let source: Arc<dyn StatusSource> = if config.exporter.pretend {
        Arc::new(PretendSource::new(config.exporter.pretend_interval()))
    } else {
        source::connect_live()
            .await
            .context("Unable to start update engine status client")?
    };

    let cancel = CancellationToken::new();

    let coordinator = Coordinator::new(Arc::clone(&aggregator), source, cancel.clone())
        .with_supervisor(SupervisorNotifier::from_env())
        .with_heartbeat_interval(config.exporter.heartbeat_interval());

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            result = wait_for_shutdown_signal() => match result {
                Ok(()) => signal_cancel.cancel(),
                Err(e) => error!(error = %e, "Shutdown signal handler failed"),
            },
            _ = signal_cancel.cancelled() => {}
        }
    });

    let state = Arc::new(AppState {
        aggregator,
        mode: coordinator.mode(),
    });
    let http_task = tokio::spawn(run_http_server(listener, state, cancel.clone()));

    let outcome = coordinator.run().await;

    // The coordinator cancels on its way out; the server drains and stops.
    cancel.cancel();
    match http_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }

    outcome.context("Update engine exporter failed")?;
    info!("Update engine exporter exited cleanly");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM, SIGINT, or Ctrl+C)
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
