//! Live update_engine source over D-Bus.
//!
//! update_engine exposes `com.coreos.update1.Manager` on the system bus. The
//! current status is fetched once with `GetStatus` and every later change
//! arrives as a `StatusUpdate` signal carrying the same tuple.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use zbus::{proxy, Connection};

use super::StatusSource;
use crate::error::{ExporterError, Result};
use crate::status::StatusSnapshot;

#[proxy(
    interface = "com.coreos.update1.Manager",
    default_service = "com.coreos.update1",
    default_path = "/com/coreos/update1"
)]
trait Manager {
    /// `(last_checked_time, progress, current_operation, new_version, new_size)`
    fn get_status(&self) -> zbus::Result<(i64, f64, String, String, i64)>;

    #[zbus(signal)]
    fn status_update(
        &self,
        last_checked_time: i64,
        progress: f64,
        current_operation: String,
        new_version: String,
        new_size: i64,
    ) -> zbus::Result<()>;
}

/// Status source backed by the update_engine D-Bus service.
pub struct UpdateEngineSource {
    proxy: ManagerProxy<'static>,
}

impl UpdateEngineSource {
    /// Connect to the system bus and bind the update_engine manager.
    pub async fn connect() -> Result<Self> {
        let connection = Connection::system()
            .await
            .map_err(|e| ExporterError::SourceUnavailable(format!("system bus: {}", e)))?;

        let proxy = ManagerProxy::new(&connection)
            .await
            .map_err(|e| ExporterError::SourceUnavailable(format!("com.coreos.update1: {}", e)))?;

        info!("Connected to update engine on the system bus");
        Ok(Self { proxy })
    }

    async fn current_status(&self) -> Result<StatusSnapshot> {
        let (last_checked_time, progress, current_operation, new_version, new_size) = self
            .proxy
            .get_status()
            .await
            .map_err(|e| ExporterError::SourceUnavailable(format!("GetStatus: {}", e)))?;

        Ok(StatusSnapshot::from_parts(
            last_checked_time,
            progress,
            current_operation,
            new_version,
            new_size,
        ))
    }
}

#[async_trait]
impl StatusSource for UpdateEngineSource {
    fn name(&self) -> &'static str {
        "update_engine"
    }

    #[instrument(skip_all, fields(source = "update_engine"))]
    async fn subscribe(
        &self,
        events: mpsc::Sender<StatusSnapshot>,
        cancel: CancellationToken,
    ) -> Result<()> {
        // Subscribe before fetching the initial status so no change is lost
        // in between.
        let mut updates = self
            .proxy
            .receive_status_update()
            .await
            .map_err(|e| ExporterError::SourceUnavailable(format!("StatusUpdate match: {}", e)))?;

        match self.current_status().await {
            Ok(status) => {
                debug!(status = %status, "Initial engine status");
                if events.send(status).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => warn!(error = %e, "Unable to fetch initial engine status, waiting for signals"),
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Update engine subscription cancelled");
                    return Ok(());
                }
                signal = updates.next() => {
                    let Some(signal) = signal else {
                        return Err(ExporterError::SourceClosed(
                            "StatusUpdate signal stream ended".to_string(),
                        ));
                    };

                    let args = match signal.args() {
                        Ok(args) => args,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable StatusUpdate signal");
                            continue;
                        }
                    };

                    let status = StatusSnapshot::from_parts(
                        *args.last_checked_time(),
                        *args.progress(),
                        args.current_operation().to_string(),
                        args.new_version().to_string(),
                        *args.new_size(),
                    );
                    debug!(status = %status, "Engine status update");

                    if events.send(status).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
