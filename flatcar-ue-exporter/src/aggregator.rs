//! Status aggregator - turns update_engine status events into metrics.
//!
//! The aggregator owns the only mutable exporter state. Every write path
//! (event application, heartbeat refresh) and the scrape path go through one
//! reader/writer lock:
//! - `apply` holds the write side for the whole logical update, so the
//!   per-operation gauge set and `time_in_current_status_s` flip together
//! - scrapes gather under the read side and therefore only ever see a
//!   complete set (exactly one operation at 1, or none before the first event)

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use prometheus::proto::MetricFamily;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use flatcar_ue_telemetry::HostFacts;

use crate::error::Result;
use crate::metrics::ExporterMetrics;
use crate::status::{OperationState, StatusSnapshot};

/// Mutable state derived from the event stream.
#[derive(Debug, Clone)]
struct AggregatorState {
    /// Operation from the last valid event (`None` until one arrives)
    current_operation: Option<OperationState>,
    /// When `current_operation` last changed
    last_transition_at: Instant,
    /// Set once data has flowed (or pretend mode engaged)
    ready: bool,
    /// Number of events applied, for logging
    events_applied: u64,
}

/// Read-only view of the aggregator, for logging and probes.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorSnapshot {
    pub current_operation: Option<OperationState>,
    pub time_in_current_state: Duration,
    pub ready: bool,
    pub events_applied: u64,
}

/// Consumes status events and keeps the exporter metrics in sync.
pub struct StatusAggregator {
    state: RwLock<AggregatorState>,
    metrics: ExporterMetrics,
}

impl StatusAggregator {
    /// Create an aggregator publishing into `metrics`.
    pub fn new(metrics: ExporterMetrics) -> Self {
        Self {
            state: RwLock::new(AggregatorState {
                current_operation: None,
                last_transition_at: Instant::now(),
                ready: false,
                events_applied: 0,
            }),
            metrics,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, AggregatorState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, AggregatorState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one status event. Never fails; malformed fields are logged.
    pub fn apply(&self, event: &StatusSnapshot) {
        let mut state = self.write_state();
        let now = Instant::now();

        match event.operation() {
            Ok(op) if state.current_operation != Some(op) => {
                info!(
                    previous = ?state.current_operation.map(|p| p.label()),
                    current = %op.label(),
                    "Update engine operation changed"
                );
                state.current_operation = Some(op);
                state.last_transition_at = now;
                self.metrics.set_operation(op);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    error = %e,
                    operation = %event.current_operation,
                    "Ignoring unknown operation in status event"
                );
            }
        }

        if state.current_operation.is_some() {
            self.metrics
                .time_in_current_status
                .set(whole_seconds(now.saturating_duration_since(state.last_transition_at)));
        }

        self.metrics.last_checked_time.set(event.last_checked_time as f64);
        self.metrics
            .last_dbus_update
            .set(Utc::now().timestamp_millis() as f64 / 1000.0);

        if event.progress.is_finite() {
            self.metrics.update_progress.set(event.progress.clamp(0.0, 1.0));
        } else {
            warn!(progress = %event.progress, "Ignoring non-finite progress in status event");
        }

        let pending = event.pending_version();
        self.metrics
            .new_version_available
            .set(if pending.is_some() { 1.0 } else { 0.0 });

        state.events_applied += 1;
        if !state.ready {
            state.ready = true;
            info!("First status event received, exporter is ready");
        }

        trace!(
            status = %event,
            pending_version = ?pending,
            events_applied = state.events_applied,
            "Applied engine status update"
        );
    }

    /// Mark the exporter ready without any event (pretend mode).
    pub fn mark_ready(&self) {
        let mut state = self.write_state();
        if !state.ready {
            state.ready = true;
            debug!("Exporter marked ready without a status event");
        }
    }

    /// Recompute `time_in_current_status_s` from the last transition.
    ///
    /// Idempotent; returns the published value, or `None` before the first
    /// valid event.
    pub fn refresh_time_in_state(&self) -> Option<Duration> {
        let state = self.read_state();
        state.current_operation?;

        let elapsed = Instant::now().saturating_duration_since(state.last_transition_at);
        self.metrics.time_in_current_status.set(whole_seconds(elapsed));
        Some(elapsed)
    }

    /// Whether the readiness probe should succeed.
    pub fn is_ready(&self) -> bool {
        self.read_state().ready
    }

    /// The current operation, if a valid event has been seen.
    pub fn current_operation(&self) -> Option<OperationState> {
        self.read_state().current_operation
    }

    /// When the current operation was entered.
    pub fn last_transition_at(&self) -> Instant {
        self.read_state().last_transition_at
    }

    /// Consistent view of the aggregator state.
    pub fn snapshot(&self) -> AggregatorSnapshot {
        let state = self.read_state();
        AggregatorSnapshot {
            current_operation: state.current_operation,
            time_in_current_state: Instant::now().saturating_duration_since(state.last_transition_at),
            ready: state.ready,
            events_applied: state.events_applied,
        }
    }

    /// Publish static host facts alongside the status metrics.
    pub fn record_host_facts(&self, facts: &HostFacts) {
        let _state = self.write_state();
        self.metrics.record_host_facts(facts);
    }

    /// Gather all metric families under the read lock.
    pub fn gather(&self) -> Vec<MetricFamily> {
        let _state = self.read_state();
        self.metrics.gather()
    }

    /// Gather and render in the Prometheus text format.
    pub fn render(&self) -> Result<String> {
        let families = self.gather();
        ExporterMetrics::encode(&families)
    }
}

/// Elapsed time truncated to whole seconds.
fn whole_seconds(elapsed: Duration) -> f64 {
    elapsed.as_secs() as f64
}
