//! # flatcar-ue-telemetry
//!
//! Static host facts for the update_engine exporter: operating system
//! identity, kernel release and uptime.
//!
//! Every provider is best-effort and fails independently. Callers are
//! expected to log a failure and simply omit the corresponding metric.

pub mod error;
pub mod kernel;
pub mod os_release;

use serde::Serialize;
use tracing::{debug, warn};

pub use error::{Result, TelemetryError};
pub use kernel::{read_kernel_release, read_uptime};
pub use os_release::{parse_os_release, read_os_release, read_os_release_from, OsRelease};

/// Host facts that cannot change without a reboot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostFacts {
    /// Operating system identity, if os-release was readable
    pub os: Option<OsRelease>,
    /// Kernel release, if available
    pub kernel_release: Option<String>,
}

impl HostFacts {
    /// Collect all static host facts, logging (not returning) failures.
    pub fn collect() -> Self {
        let os = match read_os_release() {
            Ok(release) => {
                debug!(id = %release.id, version = %release.version, board = %release.board, "Read os-release");
                Some(release)
            }
            Err(e) => {
                warn!(error = %e, "Unable to get os-release from filesystem");
                None
            }
        };

        let kernel_release = match read_kernel_release() {
            Ok(release) => {
                debug!(release = %release, "Read kernel release");
                Some(release)
            }
            Err(e) => {
                warn!(error = %e, "Unable to get kernel version");
                None
            }
        };

        Self { os, kernel_release }
    }
}
