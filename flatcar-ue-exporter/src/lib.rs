//! # flatcar-ue-exporter
//!
//! Prometheus exporter for the Flatcar Linux update engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   events   ┌──────────────────┐    ┌─────────────────┐
//! │ StatusSource │ ─────────► │ StatusAggregator │ ─► │ ExporterMetrics │
//! └──────────────┘            └──────────────────┘    └────────┬────────┘
//!                                      ▲                       │ gather
//!                              refresh │                       ▼
//!                               ┌──────┴────┐           ┌─────────────┐
//!                               │ Heartbeat │           │ HTTP server │
//!                               └───────────┘           └─────────────┘
//! ```
//!
//! The [`lifecycle::Coordinator`] owns the cancellation token and joins every
//! worker on shutdown.

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod http_server;
pub mod lifecycle;
pub mod metrics;
pub mod server;
pub mod source;
pub mod status;
pub mod supervisor;

pub use aggregator::{AggregatorSnapshot, StatusAggregator};
pub use config::Config;
pub use error::{ExporterError, Result};
pub use lifecycle::{Coordinator, LifecycleState, OperatingMode};
pub use metrics::ExporterMetrics;
pub use source::{PretendSource, StatusSource};
pub use status::{OperationState, StatusSnapshot};
pub use supervisor::SupervisorNotifier;
