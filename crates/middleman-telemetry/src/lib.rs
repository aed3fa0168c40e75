//! # Middleman Telemetry
//!
//! Logging bootstrap for the middleman process.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use middleman_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MIDDLEMAN_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `MIDDLEMAN_JSON_LOGS` | `false` | JSON formatted output |
//! | `MIDDLEMAN_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `MIDDLEMAN_SERVICE_NAME` | `middleman` | Service name |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}
