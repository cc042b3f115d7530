//! Telemetry - Structured Logging Setup
//!
//! `TigerStyle`: Optional telemetry with graceful fallback. Initialization
//! never panics; if a global subscriber is already installed the call logs
//! a warning and continues.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_memory::telemetry::{init_telemetry, TelemetryConfig};
//!
//! // Initialize with defaults (reads RUST_LOG when set)
//! init_telemetry(TelemetryConfig::default());
//!
//! // Or configure explicitly
//! let config = TelemetryConfig::builder()
//!     .service_name("memory-substrate")
//!     .filter("strata_memory=debug")
//!     .build();
//! init_telemetry(config);
//! ```

use tracing_subscriber::EnvFilter;

use crate::constants::TELEMETRY_FILTER_DEFAULT;

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name included in log output
    pub service_name: String,
    /// Env-filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit compact single-line output
    pub compact: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "strata-memory".to_string()),
            filter: TELEMETRY_FILTER_DEFAULT.to_string(),
            compact: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    filter: Option<String>,
    compact: Option<bool>,
}

impl TelemetryConfigBuilder {
    /// Set the service name.
    #[must_use]
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Set the fallback filter directive.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Emit full (non-compact) output.
    #[must_use]
    pub fn verbose(mut self) -> Self {
        self.compact = Some(false);
        self
    }

    /// Build the config, filling defaults.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();
        TelemetryConfig {
            service_name: self.service_name.unwrap_or(defaults.service_name),
            filter: self.filter.unwrap_or(defaults.filter),
            compact: self.compact.unwrap_or(defaults.compact),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Returns true if this call installed it. A second call (or a subscriber
/// installed by the host application) is not an error: the function warns
/// through the existing subscriber and returns false.
pub fn init_telemetry(config: TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.clone()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.compact {
        builder.compact().try_init()
    } else {
        builder.try_init()
    };

    match result {
        Ok(()) => {
            tracing::info!(service = %config.service_name, "telemetry initialized");
            true
        }
        Err(error) => {
            tracing::warn!(%error, "telemetry already initialized, keeping existing subscriber");
            false
        }
    }
}
