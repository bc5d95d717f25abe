//! systemd service notification (`sd_notify(3)` protocol).
//!
//! Messages are single datagrams sent to the socket named by `NOTIFY_SOCKET`.
//! A leading `@` in the socket path selects the Linux abstract namespace.
//! When `NOTIFY_SOCKET` is unset the process is not running under a notify
//! supervisor and every notification is silently skipped.

use std::ffi::OsString;
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::Result;

const ENV_NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";
const ENV_WATCHDOG_USEC: &str = "WATCHDOG_USEC";
const ENV_WATCHDOG_PID: &str = "WATCHDOG_PID";

/// Sends readiness, watchdog and stopping notifications to systemd.
#[derive(Debug, Clone)]
pub struct SupervisorNotifier {
    socket: Option<PathBuf>,
    watchdog: Option<Duration>,
}

impl SupervisorNotifier {
    /// Read the notification socket and watchdog settings from the environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var_os(ENV_NOTIFY_SOCKET),
            std::env::var(ENV_WATCHDOG_USEC).ok(),
            std::env::var(ENV_WATCHDOG_PID).ok(),
            std::process::id(),
        )
    }

    /// Build from raw variable values.
    ///
    /// The watchdog is enabled when `WATCHDOG_USEC` is a positive integer and
    /// `WATCHDOG_PID`, if set, names this process.
    pub fn from_vars(
        notify_socket: Option<OsString>,
        watchdog_usec: Option<String>,
        watchdog_pid: Option<String>,
        own_pid: u32,
    ) -> Self {
        let socket = notify_socket
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let pid_matches = match watchdog_pid.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(pid) => pid.parse::<u32>().map(|p| p == own_pid).unwrap_or(false),
        };

        let watchdog = watchdog_usec
            .and_then(|usec| usec.trim().parse::<u64>().ok())
            .filter(|usec| *usec > 0 && pid_matches)
            .map(Duration::from_micros);

        Self { socket, watchdog }
    }

    /// A notifier that never sends anything.
    pub fn disabled() -> Self {
        Self {
            socket: None,
            watchdog: None,
        }
    }

    /// Whether a supervisor socket is present.
    pub fn is_enabled(&self) -> bool {
        self.socket.is_some()
    }

    /// Watchdog timeout requested by the supervisor, if any.
    pub fn watchdog_interval(&self) -> Option<Duration> {
        self.socket.as_ref().and(self.watchdog)
    }

    /// How often to ping: half the timeout, so one late ping is tolerated.
    pub fn watchdog_ping_interval(&self) -> Option<Duration> {
        self.watchdog_interval().map(|timeout| timeout / 2)
    }

    /// Tell the supervisor startup is complete.
    pub fn notify_ready(&self) -> bool {
        self.notify_logged("READY=1")
    }

    /// Keep-alive ping for the supervisor watchdog.
    pub fn notify_watchdog(&self) -> bool {
        self.notify_logged("WATCHDOG=1")
    }

    /// Tell the supervisor shutdown has begun.
    pub fn notify_stopping(&self) -> bool {
        self.notify_logged("STOPPING=1")
    }

    fn notify_logged(&self, state: &str) -> bool {
        match self.notify(state) {
            Ok(true) => {
                trace!(state = %state, "Supervisor notified");
                true
            }
            Ok(false) => {
                debug!(state = %state, "Not notifying supervisor, no NOTIFY_SOCKET set");
                false
            }
            Err(e) => {
                warn!(
                    state = %state,
                    error = %e,
                    "Supervisor notification failed, process may be restarted by systemd"
                );
                false
            }
        }
    }

    /// Send one raw notification. `Ok(false)` when no supervisor is present.
    pub fn notify(&self, state: &str) -> Result<bool> {
        let Some(path) = &self.socket else {
            return Ok(false);
        };

        let socket = UnixDatagram::unbound()?;
        send_to_socket(&socket, state.as_bytes(), path)?;
        Ok(true)
    }
}

#[cfg(target_os = "linux")]
fn send_to_socket(socket: &UnixDatagram, message: &[u8], path: &std::path::Path) -> std::io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::net::SocketAddr;

    let raw = path.as_os_str().as_bytes();
    if let Some(name) = raw.strip_prefix(b"@") {
        let addr = SocketAddr::from_abstract_name(name)?;
        socket.send_to_addr(message, &addr)?;
    } else {
        socket.send_to(message, path)?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn send_to_socket(socket: &UnixDatagram, message: &[u8], path: &std::path::Path) -> std::io::Result<()> {
    socket.send_to(message, path)?;
    Ok(())
}
