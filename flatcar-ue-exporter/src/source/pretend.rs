//! Pretend source for dashboards and testing without update_engine.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use super::StatusSource;
use crate::error::Result;
use crate::status::{OperationState, StatusSnapshot};

/// Default period between synthetic events.
pub const DEFAULT_PRETEND_INTERVAL: Duration = Duration::from_secs(10);

/// Emits a fixed idle status on a fixed interval.
///
/// Never talks to update_engine, so the metrics surface stays up on hosts
/// where the service is intentionally absent.
pub struct PretendSource {
    period: Duration,
}

impl PretendSource {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// The event emitted on every tick.
    pub fn synthetic_status() -> StatusSnapshot {
        StatusSnapshot::new(OperationState::Idle)
    }
}

impl Default for PretendSource {
    fn default() -> Self {
        Self::new(DEFAULT_PRETEND_INTERVAL)
    }
}

#[async_trait]
impl StatusSource for PretendSource {
    fn name(&self) -> &'static str {
        "pretend"
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    async fn subscribe(
        &self,
        events: mpsc::Sender<StatusSnapshot>,
        cancel: CancellationToken,
    ) -> Result<()> {
        warn!("Running in pretend mode - not actually checking with update engine!");

        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Pretend source stopping");
                    return Ok(());
                }
                _ = timer.tick() => {
                    trace!("Emitting synthetic idle status");
                    if events.send(Self::synthetic_status()).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_emits_idle_on_interval() {
        let source = PretendSource::new(Duration::from_secs(10));
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            async move { source.subscribe(tx, cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let mut received = Vec::new();
        while let Some(status) = rx.recv().await {
            received.push(status);
        }
        assert_eq!(received.len(), 3);
        assert!(received
            .iter()
            .all(|s| s.operation().unwrap() == OperationState::Idle && s.pending_version().is_none()));
    }

    #[tokio::test]
    async fn test_stops_when_receiver_dropped() {
        let source = PretendSource::new(Duration::from_millis(1));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = source.subscribe(tx, CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_is_synthetic() {
        assert!(PretendSource::default().is_synthetic());
        assert_eq!(PretendSource::default().name(), "pretend");
    }
}
