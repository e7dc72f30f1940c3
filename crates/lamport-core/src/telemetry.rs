//! Telemetry and observability infrastructure
//!
//! TigerStyle: Explicit telemetry configuration, one initialization point.
//!
//! Installs a `tracing` subscriber with an env filter and a fmt layer.
//! Library code only emits events; embedding binaries and tests decide
//! whether to call [`init_telemetry`].

use crate::error::{Error, Result};

/// Default service name attached to log lines
const SERVICE_NAME_DEFAULT: &str = "lamport";

/// Default log level filter
const LOG_LEVEL_DEFAULT: &str = "info";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for log lines
    pub service_name: String,
    /// Whether to output events to stdout
    pub stdout_enabled: bool,
    /// Log level filter (EnvFilter syntax)
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME_DEFAULT.to_string(),
            stdout_enabled: true,
            log_level: LOG_LEVEL_DEFAULT.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Disable stdout output
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `LAMPORT_SERVICE_NAME`: Service name (default: "lamport")
    /// - `RUST_LOG`: Log level filter (default: "info")
    pub fn from_env() -> Self {
        let service_name = std::env::var("LAMPORT_SERVICE_NAME")
            .unwrap_or_else(|_| SERVICE_NAME_DEFAULT.to_string());
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| LOG_LEVEL_DEFAULT.to_string());

        Self {
            service_name,
            stdout_enabled: true,
            log_level,
        }
    }
}

/// Guard returned by [`init_telemetry`]
///
/// Held for the lifetime of the process; dropping it is a no-op today.
#[derive(Debug)]
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    /// Service name the subscriber was installed for
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns `Error::Internal` if a global subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let fmt_layer = if config.stdout_enabled {
        Some(tracing_subscriber::fmt::layer().with_target(true))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Internal {
            reason: format!("failed to initialize tracing subscriber: {}", e),
        })?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}
