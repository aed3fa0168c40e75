//! Middleman configuration from environment variables.

use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Runtime settings for [`crate::Middleman`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Name of the primary context (owns the outer channel)
    pub primary_context_name: String,

    /// Name of the forwarding context thread (owns the inner channel)
    pub forwarding_context_name: String,

    /// Bound on the forwarding context's startup handshake
    pub startup_timeout_ms: u64,

    /// While blocked in a synchronous forward, keep flushing the outbox of the
    /// waiting context's own channel (queued tasks are not run)
    pub pump_while_waiting: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            primary_context_name: "middleman-main".to_string(),
            forwarding_context_name: "middleman-forwarding".to_string(),
            startup_timeout_ms: 10_000,
            pump_while_waiting: true,
        }
    }
}

impl ForwardingConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MIDDLEMAN_PRIMARY_CONTEXT` (default: middleman-main)
    /// - `MIDDLEMAN_FORWARDING_CONTEXT` (default: middleman-forwarding)
    /// - `MIDDLEMAN_STARTUP_TIMEOUT_MS` (default: 10000)
    /// - `MIDDLEMAN_PUMP_WHILE_WAITING` (default: true)
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            primary_context_name: env::var("MIDDLEMAN_PRIMARY_CONTEXT")
                .unwrap_or(defaults.primary_context_name),

            forwarding_context_name: env::var("MIDDLEMAN_FORWARDING_CONTEXT")
                .unwrap_or(defaults.forwarding_context_name),

            startup_timeout_ms: env::var("MIDDLEMAN_STARTUP_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.startup_timeout_ms),

            pump_while_waiting: env::var("MIDDLEMAN_PUMP_WHILE_WAITING")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.pump_while_waiting),
        }
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}
