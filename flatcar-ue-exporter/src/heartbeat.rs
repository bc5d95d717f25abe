//! Heartbeat loop.
//!
//! Keeps `time_in_current_status_s` advancing while update_engine is quiet
//! and pings the systemd watchdog when one was requested.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::aggregator::StatusAggregator;
use crate::supervisor::SupervisorNotifier;

/// Default refresh period for time-based metrics.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Periodic refresher for time-dependent metrics.
pub struct Heartbeat {
    aggregator: Arc<StatusAggregator>,
    period: Duration,
    notifier: Option<SupervisorNotifier>,
}

impl Heartbeat {
    /// Create a heartbeat refreshing every `period`.
    pub fn new(aggregator: Arc<StatusAggregator>, period: Duration) -> Self {
        Self {
            aggregator,
            period,
            notifier: None,
        }
    }

    /// Also ping the supervisor watchdog, if it asked for pings.
    pub fn with_watchdog(mut self, notifier: SupervisorNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// One refresh of the time-based metrics.
    pub fn tick(&self) {
        match self.aggregator.refresh_time_in_state() {
            Some(elapsed) => trace!(seconds = elapsed.as_secs(), "Time in current status refreshed"),
            None => trace!("No operation reported yet, nothing to refresh"),
        }
    }

    /// Run until `cancel` fires. The tick in progress always completes.
    pub async fn run(self, cancel: CancellationToken) {
        let mut refresh = ticker(self.period);

        let mut watchdog = match self.notifier.as_ref().and_then(|n| n.watchdog_ping_interval()) {
            Some(ping) => {
                info!(ping_interval_ms = ping.as_millis() as u64, "Starting systemd watchdog handler");
                Some(ticker(ping))
            }
            None => None,
        };

        info!(interval_secs = self.period.as_secs(), "Starting heartbeat loop");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Heartbeat loop shutting down");
                    break;
                }
                _ = refresh.tick() => self.tick(),
                _ = optional_tick(&mut watchdog) => {
                    if let Some(notifier) = &self.notifier {
                        trace!("systemd watchdog ping");
                        notifier.notify_watchdog();
                    }
                }
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Tick an optional interval; pends forever when absent.
async fn optional_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
