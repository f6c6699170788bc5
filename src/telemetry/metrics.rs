//! Metric pipeline and instrument registry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _};
use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use crate::config::TelemetryConfig;
use crate::telemetry::endpoint::Endpoint;
use crate::telemetry::error::{Signal, SignalStatus, TelemetryError};
use crate::telemetry::global;
use crate::telemetry::resource::ResourceDescriptor;
use crate::telemetry::trace::INSTRUMENTATION_SCOPE;

/// Owns the periodic metric pipeline for the process.
pub struct MetricProvider {
    id: u64,
    provider: Option<SdkMeterProvider>,
    meter: Option<AppMeter>,
    status: SignalStatus,
    endpoint: Endpoint,
}

impl MetricProvider {
    /// Build the pipeline and install it as the global meter provider.
    ///
    /// On failure the meter is left absent and [`MetricProvider::meter`]
    /// reports why.
    pub fn new(config: &TelemetryConfig) -> Self {
        let id = global::next_provider_id();
        let endpoint = Endpoint::resolve(config, Signal::Metrics);

        let (provider, status) = if !config.metrics.enabled {
            (None, SignalStatus::Disabled)
        } else {
            match build_provider(config, &endpoint) {
                Ok(provider) => {
                    global::install_meter_provider(id, &provider);
                    tracing::debug!(
                        provider_id = id,
                        endpoint = endpoint.url(),
                        interval_secs = config.metrics.export_interval_secs,
                        "Metric pipeline ready"
                    );
                    (Some(provider), SignalStatus::Ready)
                }
                Err(e) => (None, SignalStatus::degraded(&e)),
            }
        };

        let meter = provider
            .as_ref()
            .map(|p| AppMeter::from_meter(p.meter(INSTRUMENTATION_SCOPE)));

        Self {
            id,
            provider,
            meter,
            status,
            endpoint,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> &SignalStatus {
        &self.status
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The shared meter, or `NotConfigured` when the pipeline is absent.
    pub fn meter(&self) -> Result<AppMeter, TelemetryError> {
        self.meter
            .clone()
            .ok_or_else(|| self.status.not_configured(Signal::Metrics))
    }

    /// Push pending measurements without waiting for the next tick.
    pub fn force_flush(&self) -> Result<(), TelemetryError> {
        match &self.provider {
            Some(provider) => provider.force_flush().map_err(|e| TelemetryError::Exporter {
                signal: Signal::Metrics,
                reason: e.to_string(),
            }),
            None => Err(self.status.not_configured(Signal::Metrics)),
        }
    }

    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        match &self.provider {
            Some(provider) => provider.shutdown().map_err(|e| TelemetryError::Exporter {
                signal: Signal::Metrics,
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}

fn build_provider(
    config: &TelemetryConfig,
    endpoint: &Endpoint,
) -> Result<SdkMeterProvider, TelemetryError> {
    let descriptor = ResourceDescriptor::from_config(config)?;
    endpoint.validate(Signal::Metrics)?;

    let mut builder = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary);
    if endpoint.is_explicit() {
        builder = builder.with_endpoint(endpoint.url());
    }
    let exporter = builder.build().map_err(|e| TelemetryError::Exporter {
        signal: Signal::Metrics,
        reason: e.to_string(),
    })?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.metrics.export_interval_secs))
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(descriptor.resource())
        .build())
}

/// A meter whose instruments are created once per name.
///
/// Clones share the instrument cache, so every part of the application that
/// asks for `http_requests_total` records into the same counter.
#[derive(Clone)]
pub struct AppMeter {
    meter: Meter,
    counters: Arc<DashMap<String, Counter<u64>>>,
    histograms: Arc<DashMap<String, Histogram<f64>>>,
    // keeps a private provider alive for detached meters
    _owner: Option<SdkMeterProvider>,
}

impl AppMeter {
    fn from_meter(meter: Meter) -> Self {
        Self {
            meter,
            counters: Arc::new(DashMap::new()),
            histograms: Arc::new(DashMap::new()),
            _owner: None,
        }
    }

    /// A meter that is not connected to any exporter.
    ///
    /// Used when the metric pipeline could not be configured; recordings
    /// are accepted and discarded.
    pub fn detached() -> Self {
        Self::from_provider(SdkMeterProvider::builder().build())
    }

    /// A meter on a caller-built provider, kept alive as long as the meter.
    pub fn from_provider(provider: SdkMeterProvider) -> Self {
        let mut meter = Self::from_meter(provider.meter(INSTRUMENTATION_SCOPE));
        meter._owner = Some(provider);
        meter
    }

    pub fn create_counter(&self, name: &str, description: &str, unit: Option<&str>) -> Counter<u64> {
        self.counters
            .entry(name.to_string())
            .or_insert_with(|| {
                let builder = self
                    .meter
                    .u64_counter(name.to_string())
                    .with_description(description.to_string());
                match unit {
                    Some(unit) => builder.with_unit(unit.to_string()).build(),
                    None => builder.build(),
                }
            })
            .clone()
    }

    pub fn create_histogram(
        &self,
        name: &str,
        description: &str,
        unit: Option<&str>,
    ) -> Histogram<f64> {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| {
                let builder = self
                    .meter
                    .f64_histogram(name.to_string())
                    .with_description(description.to_string());
                match unit {
                    Some(unit) => builder.with_unit(unit.to_string()).build(),
                    None => builder.build(),
                }
            })
            .clone()
    }
}
