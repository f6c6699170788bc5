//! Exporter endpoint selection.
//!
//! The deployment mode is the only switch: container deployments address the
//! collector by hostname, local deployments keep the exporters' library
//! defaults (which still honour the standard `OTEL_EXPORTER_OTLP_*` variables).
//! A per-signal endpoint in the configuration overrides both.

use url::Url;

use crate::config::{DeploymentMode, TelemetryConfig};
use crate::telemetry::error::{Signal, TelemetryError};

pub const OTLP_HTTP_PORT: u16 = 4318;
pub const PROFILER_PORT: u16 = 4040;

/// Resolved exporter address for one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: String,
    explicit: bool,
}

impl Endpoint {
    /// Resolve the endpoint for `signal` from the telemetry configuration.
    pub fn resolve(config: &TelemetryConfig, signal: Signal) -> Self {
        let configured = match signal {
            Signal::Traces => config.traces.endpoint.as_deref(),
            Signal::Metrics => config.metrics.endpoint.as_deref(),
            Signal::Logs => config.logs.endpoint.as_deref(),
            Signal::Profiles => config.profiling.server_address.as_deref(),
        };
        if let Some(url) = configured {
            return Self {
                url: url.to_string(),
                explicit: true,
            };
        }

        match config.deployment_mode {
            DeploymentMode::Container => Self {
                url: collector_url(&config.collector_host, signal),
                explicit: true,
            },
            DeploymentMode::Local => Self {
                url: collector_url("localhost", signal),
                explicit: false,
            },
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// False when the exporter should be left on its library default.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Check the address parses as an absolute http(s) URL.
    pub fn validate(&self, signal: Signal) -> Result<(), TelemetryError> {
        let invalid = |reason: String| TelemetryError::Endpoint {
            signal,
            endpoint: self.url.clone(),
            reason,
        };
        let parsed = Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme `{other}`"))),
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(())
    }
}

fn collector_url(host: &str, signal: Signal) -> String {
    match signal {
        Signal::Profiles => format!("http://{host}:{PROFILER_PORT}"),
        other => format!("http://{host}:{OTLP_HTTP_PORT}/v1/{}", other.as_str()),
    }
}
