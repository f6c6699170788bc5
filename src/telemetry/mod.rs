//! Telemetry subsystem.
//!
//! # Data Flow
//! ```text
//! TelemetryConfig (deployment mode, endpoints, batch settings)
//!     → endpoint.rs (collector address per signal)
//!     → resource.rs (service.name, service.instance.id)
//!     → trace.rs / metrics.rs / logs.rs (OTLP over HTTP, batched)
//!     → profiler.rs (Pyroscope agent, tag scopes)
//!     → global.rs (process-wide default providers)
//!
//! Consumers:
//!     → instrumentation.rs (axum server spans, store client spans)
//!     → http middleware and handlers (spans, counters, histograms)
//!     → logging.rs (tracing subscriber + log bridge)
//! ```
//!
//! # Design Decisions
//! - Providers are constructed once, before the async runtime starts, and
//!   held by [`Telemetry`]; they are also installed globally so third-party
//!   code emitting through the OpenTelemetry API is exported too
//! - Construction never fails; each provider reports a [`SignalStatus`]
//! - Export failures stay inside the SDK batch processors

pub mod endpoint;
pub mod error;
pub mod global;
pub mod instrumentation;
pub mod logging;
pub mod logs;
pub mod metrics;
pub mod profiler;
pub mod resource;
pub mod trace;

pub use error::{Signal, SignalStatus, TelemetryError};
pub use instrumentation::{InstrumentationError, InstrumentationRegistry, Instrumentor};
pub use logs::{LogBatchConfig, LogHandler, LogProvider};
pub use metrics::{AppMeter, MetricProvider};
pub use profiler::{ProfileTagger, ProfilerHandle, TagScope};
pub use resource::ResourceDescriptor;
pub use trace::{ScopedSpan, SpanFactory, TraceProvider};

use crate::config::TelemetryConfig;

/// One provider per signal, built from a single configuration.
pub struct Telemetry {
    pub traces: TraceProvider,
    pub metrics: MetricProvider,
    pub logs: LogProvider,
    pub profiler: ProfilerHandle,
}

impl Telemetry {
    /// Construct every provider. Never fails; inspect [`Telemetry::statuses`].
    pub fn init(config: &TelemetryConfig) -> Self {
        opentelemetry::global::set_text_map_propagator(
            opentelemetry_sdk::propagation::TraceContextPropagator::new(),
        );

        Self {
            traces: TraceProvider::new(config),
            metrics: MetricProvider::new(config),
            logs: LogProvider::new(config),
            profiler: ProfilerHandle::new(config),
        }
    }

    pub fn statuses(&self) -> [(Signal, &SignalStatus); 4] {
        [
            (Signal::Traces, self.traces.status()),
            (Signal::Metrics, self.metrics.status()),
            (Signal::Logs, self.logs.status()),
            (Signal::Profiles, self.profiler.status()),
        ]
    }

    /// Log the outcome of provider construction.
    ///
    /// Providers are built before the subscriber exists, so their state is
    /// reported here once logging is up.
    pub fn report(&self) {
        for (signal, status) in self.statuses() {
            match status {
                SignalStatus::Ready => tracing::info!(signal = %signal, "Telemetry signal ready"),
                SignalStatus::Disabled => {
                    tracing::info!(signal = %signal, "Telemetry signal disabled")
                }
                SignalStatus::Degraded { reason } => tracing::warn!(
                    signal = %signal,
                    reason = %reason,
                    "Telemetry signal degraded, continuing without it"
                ),
            }
        }
    }

    /// The application meter, or a detached one when metrics are unavailable.
    pub fn meter_or_detached(&self) -> AppMeter {
        self.metrics.meter().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Recording metrics into a detached meter");
            AppMeter::detached()
        })
    }

    /// Flush and stop every pipeline. Must run outside the async runtime.
    pub fn shutdown(&self) {
        if let Err(e) = self.traces.shutdown() {
            tracing::warn!(error = %e, "Trace pipeline shutdown failed");
        }
        if self.metrics.status().is_ready() {
            if let Err(e) = self.metrics.force_flush() {
                tracing::warn!(error = %e, "Metric flush before shutdown failed");
            }
        }
        if let Err(e) = self.metrics.shutdown() {
            tracing::warn!(error = %e, "Metric pipeline shutdown failed");
        }
        self.profiler.shutdown();
        if let Err(e) = self.logs.shutdown() {
            tracing::warn!(error = %e, "Log pipeline shutdown failed");
        }
    }
}
