//! Prometheus metrics for the update engine exporter.
//!
//! All metrics live in a private [`Registry`] owned by [`ExporterMetrics`];
//! nothing is registered with the process-global default registry.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use tracing::debug;

use flatcar_ue_telemetry::{HostFacts, OsRelease};

use crate::error::{ExporterError, Result};
use crate::status::OperationState;

pub const METRIC_NAMESPACE: &str = "flatcar_linux";
pub const METRIC_SUBSYSTEM: &str = "update_engine";

/// Source of the host uptime, read on every scrape.
pub type UptimeProvider = Box<dyn Fn() -> flatcar_ue_telemetry::Result<u64> + Send + Sync>;

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(METRIC_NAMESPACE)
        .subsystem(METRIC_SUBSYSTEM)
}

/// Uptime gauge evaluated at collection time. Omitted when unreadable.
struct UptimeCollector {
    gauge: Gauge,
    provider: UptimeProvider,
}

impl Collector for UptimeCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match (self.provider)() {
            Ok(secs) => {
                self.gauge.set(secs as f64);
                self.gauge.collect()
            }
            Err(e) => {
                debug!(error = %e, "Skipping uptime metric");
                Vec::new()
            }
        }
    }
}

/// Gauges published by the exporter.
pub struct ExporterMetrics {
    registry: Registry,
    /// Unix time of the engine's last update check
    pub(crate) last_checked_time: Gauge,
    /// Wall-clock time the last status event was observed
    pub(crate) last_dbus_update: Gauge,
    /// One series per operation, 1 for the current one
    pub(crate) status: GaugeVec,
    /// Whole seconds spent in the current operation
    pub(crate) time_in_current_status: Gauge,
    /// 1 when a new version is pending
    pub(crate) new_version_available: Gauge,
    /// Download/verify progress fraction
    pub(crate) update_progress: Gauge,
    /// Operating system identity, value always 1
    pub(crate) os: GaugeVec,
    /// Kernel release, value always 1
    pub(crate) kernel: GaugeVec,
}

impl ExporterMetrics {
    /// Create and register all metrics, reading uptime from the host.
    pub fn new() -> Result<Self> {
        Self::with_uptime_provider(Box::new(flatcar_ue_telemetry::read_uptime))
    }

    /// Create and register all metrics with a custom uptime source.
    pub fn with_uptime_provider(uptime: UptimeProvider) -> Result<Self> {
        let registry = Registry::new();

        let last_checked_time = Gauge::with_opts(opts(
            "last_checked_time_s",
            "Unix time of the last update check performed by update_engine",
        ))?;
        let last_dbus_update = Gauge::with_opts(opts(
            "last_dbus_update",
            "Unix time the last status event was received from update_engine",
        ))?;
        let status = GaugeVec::new(
            opts("status", "Current update_engine operation (1 for the active operation)"),
            &["op"],
        )?;
        let time_in_current_status = Gauge::with_opts(opts(
            "time_in_current_status_s",
            "Seconds spent in the current update_engine operation",
        ))?;
        let new_version_available = Gauge::with_opts(opts(
            "new_version_available",
            "Whether update_engine reports a pending new version",
        ))?;
        let update_progress = Gauge::with_opts(opts(
            "update_progress_pct",
            "Download/verify progress of the current update (0-1)",
        ))?;
        let os = GaugeVec::new(
            opts("os", "Operating system identity from os-release"),
            &["id", "version", "board"],
        )?;
        let kernel = GaugeVec::new(opts("kernel", "Running kernel release"), &["release"])?;
        let uptime = UptimeCollector {
            gauge: Gauge::with_opts(opts("system_uptime_s", "Host uptime in seconds"))?,
            provider: uptime,
        };

        registry.register(Box::new(last_checked_time.clone()))?;
        registry.register(Box::new(last_dbus_update.clone()))?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(time_in_current_status.clone()))?;
        registry.register(Box::new(new_version_available.clone()))?;
        registry.register(Box::new(update_progress.clone()))?;
        registry.register(Box::new(os.clone()))?;
        registry.register(Box::new(kernel.clone()))?;
        registry.register(Box::new(uptime))?;

        Ok(Self {
            registry,
            last_checked_time,
            last_dbus_update,
            status,
            time_in_current_status,
            new_version_available,
            update_progress,
            os,
            kernel,
        })
    }

    /// Write the whole per-operation set: `current` to 1, every other to 0.
    ///
    /// Callers must hold the aggregator's write lock so that no scrape sees a
    /// partially written set.
    pub(crate) fn set_operation(&self, current: OperationState) {
        for op in OperationState::ALL {
            let value = if op == current { 1.0 } else { 0.0 };
            self.status.with_label_values(&[op.label()]).set(value);
        }
    }

    /// Publish static host facts. Missing facts are simply not exported.
    pub fn record_host_facts(&self, facts: &HostFacts) {
        if let Some(OsRelease { id, version, board }) = &facts.os {
            self.os
                .with_label_values(&[id.as_str(), version.as_str(), board.as_str()])
                .set(1.0);
        }
        if let Some(release) = &facts.kernel_release {
            self.kernel.with_label_values(&[release.as_str()]).set(1.0);
        }
    }

    /// Point-in-time copy of every metric family.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render metric families in the Prometheus text exposition format.
    pub fn encode(families: &[MetricFamily]) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| ExporterError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for reading gathered values back in tests.

    use prometheus::proto::MetricFamily;

    use super::{METRIC_NAMESPACE, METRIC_SUBSYSTEM};

    pub fn full_name(name: &str) -> String {
        format!("{}_{}_{}", METRIC_NAMESPACE, METRIC_SUBSYSTEM, name)
    }

    /// Value of an unlabelled gauge, if exported.
    pub fn gauge(families: &[MetricFamily], name: &str) -> Option<f64> {
        let name = full_name(name);
        families
            .iter()
            .find(|mf| mf.get_name() == name)
            .and_then(|mf| mf.get_metric().first())
            .map(|m| m.get_gauge().get_value())
    }

    /// `(op label, value)` for every exported per-operation series.
    pub fn status_series(families: &[MetricFamily]) -> Vec<(String, f64)> {
        let name = full_name("status");
        families
            .iter()
            .filter(|mf| mf.get_name() == name)
            .flat_map(|mf| mf.get_metric().iter())
            .map(|m| {
                let op = m
                    .get_label()
                    .iter()
                    .find(|l| l.get_name() == "op")
                    .map(|l| l.get_value().to_string())
                    .unwrap_or_default();
                (op, m.get_gauge().get_value())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use flatcar_ue_telemetry::TelemetryError;

    fn metrics_with_uptime(secs: u64) -> ExporterMetrics {
        ExporterMetrics::with_uptime_provider(Box::new(move || Ok(secs))).unwrap()
    }

    #[test]
    fn test_set_operation_writes_full_set() {
        let metrics = metrics_with_uptime(1);
        metrics.set_operation(OperationState::Verifying);

        let series = status_series(&metrics.gather());
        assert_eq!(series.len(), OperationState::ALL.len());
        for (op, value) in series {
            let expected = if op == "VERIFYING" { 1.0 } else { 0.0 };
            assert_eq!(value, expected, "op {}", op);
        }
    }

    #[test]
    fn test_no_status_series_before_first_operation() {
        let metrics = metrics_with_uptime(1);
        assert!(status_series(&metrics.gather()).is_empty());
    }

    #[test]
    fn test_uptime_read_at_gather_time() {
        let metrics = metrics_with_uptime(4242);
        assert_eq!(gauge(&metrics.gather(), "system_uptime_s"), Some(4242.0));
    }

    #[test]
    fn test_uptime_omitted_on_failure() {
        let metrics = ExporterMetrics::with_uptime_provider(Box::new(|| {
            Err(TelemetryError::UptimeUnavailable("test".to_string()))
        }))
        .unwrap();
        assert_eq!(gauge(&metrics.gather(), "system_uptime_s"), None);
    }

    #[test]
    fn test_record_host_facts() {
        let metrics = metrics_with_uptime(1);
        metrics.record_host_facts(&HostFacts {
            os: Some(OsRelease {
                id: "flatcar".to_string(),
                version: "3815.2.0".to_string(),
                board: "amd64-usr".to_string(),
            }),
            kernel_release: None,
        });

        let text = ExporterMetrics::encode(&metrics.gather()).unwrap();
        assert!(text.contains(
            "flatcar_linux_update_engine_os{board=\"amd64-usr\",id=\"flatcar\",version=\"3815.2.0\"} 1"
        ));
        assert!(!text.contains("flatcar_linux_update_engine_kernel{"));
    }

    #[test]
    fn test_encode_text_format() {
        let metrics = metrics_with_uptime(1);
        metrics.last_checked_time.set(1000.0);

        let text = ExporterMetrics::encode(&metrics.gather()).unwrap();
        assert!(text.contains("# TYPE flatcar_linux_update_engine_last_checked_time_s gauge"));
        assert!(text.contains("flatcar_linux_update_engine_last_checked_time_s 1000"));
    }
}
