//! Status sources.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            StatusSource trait           │
//! │      subscribe(events, cancellation)    │
//! └─────────────────────┬───────────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │ UpdateEngineSource│     │   PretendSource   │
//! │  (D-Bus, live)    │     │ (synthetic idle)  │
//! └───────────────────┘     └───────────────────┘
//! ```

mod pretend;
#[cfg(feature = "update-engine")]
mod update_engine;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::status::StatusSnapshot;

pub use pretend::{PretendSource, DEFAULT_PRETEND_INTERVAL};
#[cfg(feature = "update-engine")]
pub use update_engine::UpdateEngineSource;

/// Producer of update_engine status events.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether events are synthesized rather than observed.
    fn is_synthetic(&self) -> bool {
        false
    }

    /// Deliver events in order until `cancel` fires or the source closes.
    ///
    /// Returns `Ok(())` when cancelled or when the receiver is gone, and an
    /// error when the underlying service stopped delivering on its own.
    /// No event is sent after this returns.
    async fn subscribe(
        &self,
        events: mpsc::Sender<StatusSnapshot>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Connect to the live update_engine on the system bus.
#[cfg(feature = "update-engine")]
pub async fn connect_live() -> Result<Arc<dyn StatusSource>> {
    Ok(Arc::new(UpdateEngineSource::connect().await?))
}

/// Connect to the live update_engine on the system bus.
#[cfg(not(feature = "update-engine"))]
pub async fn connect_live() -> Result<Arc<dyn StatusSource>> {
    Err(crate::error::ExporterError::SourceUnavailable(
        "built without the update-engine feature; only pretend mode is available".to_string(),
    ))
}
