use std::fmt;

use thiserror::Error;

/// The telemetry signal a provider is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
    Profiles,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
            Signal::Profiles => "profiles",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// The provider was disabled or failed during construction.
    #[error("{signal} pipeline is not configured: {reason}")]
    NotConfigured { signal: Signal, reason: String },

    #[error("invalid resource: {0}")]
    Resource(String),

    #[error("invalid {signal} endpoint `{endpoint}`: {reason}")]
    Endpoint {
        signal: Signal,
        endpoint: String,
        reason: String,
    },

    #[error("failed to build {signal} exporter: {reason}")]
    Exporter { signal: Signal, reason: String },

    #[error("profiler error: {0}")]
    Profiler(String),

    #[error("failed to install log subscriber: {0}")]
    Subscriber(String),
}

/// Outcome of constructing a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalStatus {
    Ready,
    /// Switched off in configuration.
    Disabled,
    /// Construction failed; the provider is inert for the life of the process.
    Degraded { reason: String },
}

impl SignalStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SignalStatus::Ready)
    }

    pub(crate) fn degraded(error: &TelemetryError) -> Self {
        SignalStatus::Degraded {
            reason: error.to_string(),
        }
    }

    /// The error returned when a caller uses a provider in this state.
    pub(crate) fn not_configured(&self, signal: Signal) -> TelemetryError {
        let reason = match self {
            SignalStatus::Ready => "provider is ready".to_string(),
            SignalStatus::Disabled => "disabled in configuration".to_string(),
            SignalStatus::Degraded { reason } => reason.clone(),
        };
        TelemetryError::NotConfigured { signal, reason }
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStatus::Ready => f.write_str("ready"),
            SignalStatus::Disabled => f.write_str("disabled"),
            SignalStatus::Degraded { reason } => write!(f, "degraded ({reason})"),
        }
    }
}
