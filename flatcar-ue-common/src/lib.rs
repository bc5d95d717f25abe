//! # flatcar-ue-common
//!
//! Shared utilities for the update_engine exporter binaries.
//!
//! ## Logging
//!
//! ```no_run
//! use flatcar_ue_common::{init_logging_with_format, LogFormat};
//!
//! init_logging_with_format(LogFormat::Pretty, "info").unwrap();
//! tracing::info!("exporter starting");
//! ```

pub mod logging;

pub use logging::{
    init_logging,
    init_logging_json,
    init_logging_with_format,
    LogFormat,
};
