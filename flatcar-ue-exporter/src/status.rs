//! Update status types
//!
//! Mirrors the status tuple published by update_engine over D-Bus:
//! `(last_checked_time, progress, current_operation, new_version, new_size)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExporterError;

/// Prefix shared by every operation name on the wire.
pub const UPDATE_STATUS_PREFIX: &str = "UPDATE_STATUS_";

/// Version update_engine reports when no update is pending.
pub const NO_VERSION: &str = "0.0.0";

/// Phase of the update lifecycle reported by update_engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// No update operation in progress
    Idle,
    /// Checking the update server
    CheckingForUpdate,
    /// Update found, not yet downloading
    UpdateAvailable,
    /// Downloading the payload
    Downloading,
    /// Verifying the downloaded payload
    Verifying,
    /// Writing the payload to the passive partition
    Finalizing,
    /// Update applied, reboot required
    UpdatedNeedReboot,
    /// Reporting a failed update to the server
    ReportingErrorEvent,
}

impl OperationState {
    /// Every state, in the order the gauge set is written.
    pub const ALL: [OperationState; 8] = [
        OperationState::Idle,
        OperationState::CheckingForUpdate,
        OperationState::UpdateAvailable,
        OperationState::Downloading,
        OperationState::Verifying,
        OperationState::Finalizing,
        OperationState::UpdatedNeedReboot,
        OperationState::ReportingErrorEvent,
    ];

    /// Name as sent by update_engine.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            OperationState::Idle => "UPDATE_STATUS_IDLE",
            OperationState::CheckingForUpdate => "UPDATE_STATUS_CHECKING_FOR_UPDATE",
            OperationState::UpdateAvailable => "UPDATE_STATUS_UPDATE_AVAILABLE",
            OperationState::Downloading => "UPDATE_STATUS_DOWNLOADING",
            OperationState::Verifying => "UPDATE_STATUS_VERIFYING",
            OperationState::Finalizing => "UPDATE_STATUS_FINALIZING",
            OperationState::UpdatedNeedReboot => "UPDATE_STATUS_UPDATED_NEED_REBOOT",
            OperationState::ReportingErrorEvent => "UPDATE_STATUS_REPORTING_ERROR_EVENT",
        }
    }

    /// Value of the `op` label, e.g. `DOWNLOADING`.
    pub fn label(&self) -> &'static str {
        &self.as_wire_str()[UPDATE_STATUS_PREFIX.len()..]
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire_str())
    }
}

impl FromStr for OperationState {
    type Err = ExporterError;

    /// Accepts only the exact wire name, e.g. `UPDATE_STATUS_IDLE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationState::ALL
            .iter()
            .copied()
            .find(|op| op.as_wire_str() == s)
            .ok_or_else(|| ExporterError::UnknownOperation(s.to_string()))
    }
}

/// One status event from the update engine. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Unix time of the last update check
    pub last_checked_time: i64,
    /// Download/verify progress, 0.0 to 1.0
    pub progress: f64,
    /// Raw operation name; validated by the aggregator
    pub current_operation: String,
    /// Pending version, `0.0.0` when none
    pub new_version: String,
    /// Size of the pending payload in bytes
    pub new_size: i64,
}

impl StatusSnapshot {
    /// A quiet status in the given state: no progress, nothing pending.
    pub fn new(operation: OperationState) -> Self {
        Self {
            last_checked_time: 0,
            progress: 0.0,
            current_operation: operation.as_wire_str().to_string(),
            new_version: NO_VERSION.to_string(),
            new_size: 0,
        }
    }

    pub fn with_last_checked_time(mut self, unix_secs: i64) -> Self {
        self.last_checked_time = unix_secs;
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_new_version(mut self, version: impl Into<String>) -> Self {
        self.new_version = version.into();
        self
    }

    pub fn with_new_size(mut self, bytes: i64) -> Self {
        self.new_size = bytes;
        self
    }

    /// Build from the raw D-Bus tuple.
    pub fn from_parts(
        last_checked_time: i64,
        progress: f64,
        current_operation: String,
        new_version: String,
        new_size: i64,
    ) -> Self {
        Self {
            last_checked_time,
            progress,
            current_operation,
            new_version,
            new_size,
        }
    }

    /// The reported operation, if it is one of the known states.
    pub fn operation(&self) -> Result<OperationState, ExporterError> {
        self.current_operation.parse()
    }

    /// The pending version, unless it is empty or the "no version" sentinel.
    pub fn pending_version(&self) -> Option<&str> {
        let version = self.new_version.trim();
        if version.is_empty() || version == NO_VERSION {
            None
        } else {
            Some(version)
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LastCheckedTime={} Progress={} CurrentOperation={:?} NewVersion={} NewSize={}",
            self.last_checked_time,
            self.progress,
            self.current_operation,
            self.new_version,
            self.new_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_strip_prefix() {
        assert_eq!(OperationState::Idle.label(), "IDLE");
        assert_eq!(OperationState::UpdatedNeedReboot.label(), "UPDATED_NEED_REBOOT");
        assert_eq!(OperationState::ReportingErrorEvent.label(), "REPORTING_ERROR_EVENT");
    }

    #[test]
    fn test_parse_wire_names() {
        for op in OperationState::ALL {
            assert_eq!(op.as_wire_str().parse::<OperationState>().unwrap(), op);
        }
    }

    #[test]
    fn test_parse_rejects_non_wire_names() {
        for name in ["IDLE", "DOWNLOADING", " UPDATE_STATUS_IDLE", "UPDATE_STATUS_IDLE\n", "update_status_idle"] {
            assert!(
                matches!(name.parse::<OperationState>(), Err(ExporterError::UnknownOperation(_))),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = "UPDATE_STATUS_ATTEMPTING_ROLLBACK".parse::<OperationState>().unwrap_err();
        assert!(matches!(err, ExporterError::UnknownOperation(ref s) if s == "UPDATE_STATUS_ATTEMPTING_ROLLBACK"));
        assert!("".parse::<OperationState>().is_err());
    }

    #[test]
    fn test_pending_version() {
        let status = StatusSnapshot::new(OperationState::UpdatedNeedReboot).with_new_version("3.2.1");
        assert_eq!(status.pending_version(), Some("3.2.1"));

        let status = status.with_new_version(NO_VERSION);
        assert_eq!(status.pending_version(), None);

        let status = status.with_new_version("");
        assert_eq!(status.pending_version(), None);
    }

    #[test]
    fn test_display_matches_engine_format() {
        let status = StatusSnapshot::new(OperationState::Downloading)
            .with_last_checked_time(1000)
            .with_progress(0.5)
            .with_new_version("3815.2.1")
            .with_new_size(1024);

        assert_eq!(
            status.to_string(),
            "LastCheckedTime=1000 Progress=0.5 CurrentOperation=\"UPDATE_STATUS_DOWNLOADING\" NewVersion=3815.2.1 NewSize=1024"
        );
    }
}
