//! Lifecycle coordinator.
//!
//! Wires the status source, the aggregator and the heartbeat under a single
//! cancellation token:
//!
//! ```text
//! Starting ──► Running ──► Draining ──► Stopped
//! ```
//!
//! - `Starting`: host facts recorded once; pretend mode is ready immediately,
//!   live mode notifies systemd that startup finished
//! - `Running`: events applied in arrival order; cancellation wins over a
//!   pending event
//! - `Draining`: source and heartbeat cancelled and joined
//! - `Stopped`: all workers gone, state dropped with the process

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use flatcar_ue_telemetry::HostFacts;

use crate::aggregator::StatusAggregator;
use crate::error::{ExporterError, Result};
use crate::heartbeat::Heartbeat;
use crate::source::StatusSource;
use crate::supervisor::SupervisorNotifier;

/// Capacity of the source → aggregator channel.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// Whether the exporter observes a real update_engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Subscribed to update_engine; ready after the first event
    Live,
    /// Synthetic events only; ready immediately
    Degraded,
}

impl OperatingMode {
    pub fn for_source(source: &dyn StatusSource) -> Self {
        if source.is_synthetic() {
            OperatingMode::Degraded
        } else {
            OperatingMode::Live
        }
    }
}

/// Owns the workers and their shared cancellation.
pub struct Coordinator {
    aggregator: Arc<StatusAggregator>,
    source: Arc<dyn StatusSource>,
    mode: OperatingMode,
    notifier: SupervisorNotifier,
    heartbeat_interval: Duration,
    host_facts: Option<HostFacts>,
    cancel: CancellationToken,
    state: watch::Sender<LifecycleState>,
}

impl Coordinator {
    /// Create a coordinator. The mode follows the source.
    ///
    /// A degraded coordinator marks the aggregator ready right away, so the
    /// readiness probe passes before `run` is even polled.
    pub fn new(
        aggregator: Arc<StatusAggregator>,
        source: Arc<dyn StatusSource>,
        cancel: CancellationToken,
    ) -> Self {
        let mode = OperatingMode::for_source(source.as_ref());
        let (state, _) = watch::channel(LifecycleState::Starting);

        if mode == OperatingMode::Degraded {
            aggregator.mark_ready();
        }

        Self {
            aggregator,
            source,
            mode,
            notifier: SupervisorNotifier::disabled(),
            heartbeat_interval: crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL,
            host_facts: None,
            cancel,
            state,
        }
    }

    /// Supervisor used for readiness and watchdog in live mode.
    pub fn with_supervisor(mut self, notifier: SupervisorNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Use these host facts instead of reading them from the host.
    pub fn with_host_facts(mut self, facts: HostFacts) -> Self {
        self.host_facts = Some(facts);
        self
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = *self.state.borrow();
        debug!(from = ?previous, to = ?next, "Lifecycle transition");
        self.state.send_replace(next);
    }

    /// Run until cancelled or the source fails.
    ///
    /// Returns an error only when a live source stopped on its own; normal
    /// cancellation returns `Ok(())`.
    pub async fn run(self) -> Result<()> {
        // Starting
        let facts = self.host_facts.clone().unwrap_or_else(HostFacts::collect);
        self.aggregator.record_host_facts(&facts);

        match self.mode {
            OperatingMode::Degraded => {
                info!(source = self.source.name(), "Degraded mode, exporter ready without update engine");
            }
            OperatingMode::Live => {
                if self.notifier.notify_ready() {
                    info!("systemd notified exporter is ready");
                }
            }
        }

        let mut heartbeat = Heartbeat::new(Arc::clone(&self.aggregator), self.heartbeat_interval);
        if self.mode == OperatingMode::Live {
            heartbeat = heartbeat.with_watchdog(self.notifier.clone());
        }
        let heartbeat_task = tokio::spawn(heartbeat.run(self.cancel.child_token()));

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let source = Arc::clone(&self.source);
        let source_cancel = self.cancel.child_token();
        let source_task = tokio::spawn(async move { source.subscribe(events_tx, source_cancel).await });

        info!(source = self.source.name(), mode = ?self.mode, "Started update engine status client");
        self.transition(LifecycleState::Running);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Shutting down update engine exporter");
                    break;
                }
                event = events_rx.recv() => match event {
                    Some(status) => self.aggregator.apply(&status),
                    None => {
                        debug!("Status source channel closed");
                        break;
                    }
                }
            }
        }

        // Draining
        self.transition(LifecycleState::Draining);
        let cancelled = self.cancel.is_cancelled();
        self.cancel.cancel();
        drop(events_rx);

        let source_result = match source_task.await {
            Ok(result) => result,
            Err(e) => Err(ExporterError::SourceClosed(format!("source task failed: {}", e))),
        };
        if let Err(e) = heartbeat_task.await {
            warn!(error = %e, "Heartbeat task failed");
        }

        if self.mode == OperatingMode::Live {
            self.notifier.notify_stopping();
        }
        self.transition(LifecycleState::Stopped);

        match source_result {
            Err(e) => {
                error!(error = %e, "Status source failed");
                Err(e)
            }
            Ok(()) if !cancelled => {
                let e = ExporterError::SourceClosed(format!(
                    "{} stopped delivering status events",
                    self.source.name()
                ));
                error!(error = %e, "Status source ended unexpectedly");
                Err(e)
            }
            Ok(()) => {
                info!("Exporter stopped");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ExporterMetrics;
    use crate::source::PretendSource;
    use crate::status::{OperationState, StatusSnapshot};
    use async_trait::async_trait;

    /// Sends nothing, waits for cancellation.
    struct SilentSource;

    #[async_trait]
    impl StatusSource for SilentSource {
        fn name(&self) -> &'static str {
            "silent"
        }

        async fn subscribe(
            &self,
            _events: mpsc::Sender<StatusSnapshot>,
            cancel: CancellationToken,
        ) -> Result<()> {
            cancel.cancelled().await;
            Ok(())
        }
    }

    /// Queues a burst of events, then waits for cancellation.
    struct BurstSource;

    #[async_trait]
    impl StatusSource for BurstSource {
        fn name(&self) -> &'static str {
            "burst"
        }

        async fn subscribe(
            &self,
            events: mpsc::Sender<StatusSnapshot>,
            cancel: CancellationToken,
        ) -> Result<()> {
            for _ in 0..8 {
                if events.send(StatusSnapshot::new(OperationState::Idle)).await.is_err() {
                    return Ok(());
                }
            }
            cancel.cancelled().await;
            Ok(())
        }
    }

    /// Sends one event then fails.
    struct FailingSource;

    #[async_trait]
    impl StatusSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn subscribe(
            &self,
            events: mpsc::Sender<StatusSnapshot>,
            _cancel: CancellationToken,
        ) -> Result<()> {
            let _ = events.send(StatusSnapshot::new(OperationState::Idle)).await;
            Err(ExporterError::SourceClosed("bus went away".to_string()))
        }
    }

    fn aggregator() -> Arc<StatusAggregator> {
        let metrics = ExporterMetrics::with_uptime_provider(Box::new(|| Ok(1))).unwrap();
        Arc::new(StatusAggregator::new(metrics))
    }

    fn coordinator(source: Arc<dyn StatusSource>, cancel: CancellationToken) -> (Arc<StatusAggregator>, Coordinator) {
        let agg = aggregator();
        let coordinator = Coordinator::new(Arc::clone(&agg), source, cancel)
            .with_host_facts(HostFacts::default());
        (agg, coordinator)
    }

    #[tokio::test]
    async fn test_live_mode_not_ready_without_events() {
        let cancel = CancellationToken::new();
        let (agg, coordinator) = coordinator(Arc::new(SilentSource), cancel.clone());
        assert_eq!(coordinator.mode(), OperatingMode::Live);

        let mut states = coordinator.subscribe_state();
        let handle = tokio::spawn(coordinator.run());
        states.wait_for(|s| *s == LifecycleState::Running).await.unwrap();
        assert!(!agg.is_ready());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_mode_ready_immediately() {
        let cancel = CancellationToken::new();
        let source = Arc::new(PretendSource::new(Duration::from_secs(10)));
        let (agg, coordinator) = coordinator(source, cancel.clone());
        assert_eq!(coordinator.mode(), OperatingMode::Degraded);

        let mut states = coordinator.subscribe_state();
        let handle = tokio::spawn(coordinator.run());
        states.wait_for(|s| *s == LifecycleState::Running).await.unwrap();
        assert!(agg.is_ready());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(agg.current_operation(), Some(OperationState::Idle));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_pending_events() {
        let cancel = CancellationToken::new();
        let (agg, coordinator) = coordinator(Arc::new(BurstSource), cancel.clone());
        cancel.cancel();

        coordinator.run().await.unwrap();
        assert_eq!(agg.snapshot().events_applied, 0);
        assert_eq!(agg.current_operation(), None);
    }

    #[test]
    fn test_degraded_coordinator_ready_before_run() {
        let agg = aggregator();
        let coordinator = Coordinator::new(
            Arc::clone(&agg),
            Arc::new(PretendSource::default()),
            CancellationToken::new(),
        );
        assert_eq!(coordinator.mode(), OperatingMode::Degraded);
        assert!(agg.is_ready());

        let live = aggregator();
        let _ = Coordinator::new(Arc::clone(&live), Arc::new(SilentSource), CancellationToken::new());
        assert!(!live.is_ready());
    }

    #[tokio::test]
    async fn test_source_failure_is_returned() {
        let cancel = CancellationToken::new();
        let (agg, coordinator) = coordinator(Arc::new(FailingSource), cancel.clone());

        let result = coordinator.run().await;
        assert!(matches!(result, Err(ExporterError::SourceClosed(_))));
        assert!(cancel.is_cancelled());
        assert!(agg.is_ready());
    }

    #[tokio::test]
    async fn test_cancel_before_run_stops_cleanly() {
        let cancel = CancellationToken::new();
        let (_agg, coordinator) = coordinator(Arc::new(SilentSource), cancel.clone());
        cancel.cancel();

        let states = coordinator.subscribe_state();
        coordinator.run().await.unwrap();
        assert_eq!(*states.borrow(), LifecycleState::Stopped);
    }
}
