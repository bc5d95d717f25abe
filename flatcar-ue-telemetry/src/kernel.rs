//! Kernel release and uptime.

use sysinfo::System;

use crate::error::{Result, TelemetryError};

/// Kernel release string as reported by `uname -r`.
pub fn read_kernel_release() -> Result<String> {
    match System::kernel_version() {
        Some(release) if !release.trim().is_empty() => Ok(release.trim().to_string()),
        Some(_) => Err(TelemetryError::KernelUnavailable("empty release".to_string())),
        None => Err(TelemetryError::KernelUnavailable(
            "not supported on this platform".to_string(),
        )),
    }
}

/// Seconds since boot.
pub fn read_uptime() -> Result<u64> {
    match System::uptime() {
        0 => Err(TelemetryError::UptimeUnavailable(
            "platform reported zero uptime".to_string(),
        )),
        secs => Ok(secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_kernel_release_on_linux() {
        let release = read_kernel_release().unwrap();
        assert!(!release.is_empty());
        assert!(!release.contains('\0'));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_uptime_on_linux() {
        assert!(read_uptime().unwrap() > 0);
    }
}
