//! # XC Telemetry
//!
//! Logging and Prometheus metrics for Cross-Channel nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XC_SERVICE_NAME` | `cross-channel` | Service name in logs |
//! | `XC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `XC_CONSOLE_OUTPUT` | `true` | Print logs to stdout |
//! | `XC_JSON_LOGS` | `false` | JSON log lines |

#![warn(clippy::all)]

mod config;
mod logging;
pub mod metrics;

pub use config::{parse_flag, TelemetryConfig};
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, COLLABORATOR_TIMEOUTS, DISPATCH_DURATION,
    EVENTS_PERSISTED, MESSAGES_DROPPED, MESSAGES_RECEIVED, REGISTRY, STATE_CHANGES_LOGGED,
    SWAP_TRANSITIONS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Register metrics, then install the log subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_logging(config)
}
