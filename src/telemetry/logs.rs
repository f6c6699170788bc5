//! Log pipeline and its bridge from `tracing` events.

use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{LogExporter, Protocol, WithExportConfig};
use opentelemetry_sdk::logs::{BatchConfig, BatchConfigBuilder, BatchLogProcessor, SdkLoggerProvider};
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::config::TelemetryConfig;
use crate::telemetry::endpoint::Endpoint;
use crate::telemetry::error::{Signal, SignalStatus, TelemetryError};
use crate::telemetry::resource::ResourceDescriptor;

/// Targets whose events never reach the exporter. The exporter's own HTTP
/// client logs through `tracing`, and bridging those events would feed back
/// into the pipeline.
const EXCLUDED_TARGETS: &[&str] = &[
    "hyper",
    "hyper_util",
    "h2",
    "reqwest",
    "tower",
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
];

/// Settings of the batching log processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogBatchConfig {
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
}

impl LogBatchConfig {
    fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            max_queue_size: config.logs.max_queue_size,
            max_export_batch_size: config.logs.max_export_batch_size,
        }
    }

    fn processor_config(&self) -> BatchConfig {
        BatchConfigBuilder::default()
            .with_max_queue_size(self.max_queue_size)
            .with_max_export_batch_size(self.max_export_batch_size)
            .build()
    }
}

/// Owns the log pipeline. Nothing is exported until [`LogProvider::setup_logging`]
/// hands out a handler.
pub struct LogProvider {
    status: SignalStatus,
    endpoint: Endpoint,
    resource: Option<ResourceDescriptor>,
    batch: LogBatchConfig,
    provider: Option<SdkLoggerProvider>,
}

impl LogProvider {
    pub fn new(config: &TelemetryConfig) -> Self {
        let endpoint = Endpoint::resolve(config, Signal::Logs);
        let batch = LogBatchConfig::from_config(config);

        let prepared = if config.logs.enabled {
            ResourceDescriptor::from_config(config)
                .and_then(|descriptor| endpoint.validate(Signal::Logs).map(|()| descriptor))
                .map(Some)
        } else {
            Ok(None)
        };

        let (status, resource) = match prepared {
            Ok(Some(descriptor)) => (SignalStatus::Ready, Some(descriptor)),
            Ok(None) => (SignalStatus::Disabled, None),
            Err(e) => (SignalStatus::degraded(&e), None),
        };

        Self {
            status,
            endpoint,
            resource,
            batch,
            provider: None,
        }
    }

    pub fn status(&self) -> &SignalStatus {
        &self.status
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Build the exporter and return a handler bridging `tracing` into it.
    ///
    /// Fails with [`TelemetryError::NotConfigured`] when the provider is not
    /// ready. Calling it again returns a handler on the same pipeline.
    pub fn setup_logging(&mut self) -> Result<LogHandler, TelemetryError> {
        let resource = match (&self.status, &self.resource) {
            (SignalStatus::Ready, Some(descriptor)) => descriptor.resource(),
            _ => return Err(self.status.not_configured(Signal::Logs)),
        };

        if let Some(provider) = &self.provider {
            return Ok(LogHandler {
                provider: provider.clone(),
                batch: self.batch,
            });
        }

        let mut builder = LogExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary);
        if self.endpoint.is_explicit() {
            builder = builder.with_endpoint(self.endpoint.url());
        }
        let exporter = builder.build().map_err(|e| TelemetryError::Exporter {
            signal: Signal::Logs,
            reason: e.to_string(),
        })?;

        let handler = LogHandler::from_exporter(exporter, resource, self.batch);
        self.provider = Some(handler.provider.clone());
        tracing::debug!(
            endpoint = self.endpoint.url(),
            max_queue_size = self.batch.max_queue_size,
            max_export_batch_size = self.batch.max_export_batch_size,
            "Log pipeline ready"
        );
        Ok(handler)
    }

    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        match &self.provider {
            Some(provider) => provider.shutdown().map_err(|e| TelemetryError::Exporter {
                signal: Signal::Logs,
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Bridge from `tracing` events into the log pipeline.
pub struct LogHandler {
    provider: SdkLoggerProvider,
    batch: LogBatchConfig,
}

impl LogHandler {
    fn from_exporter<E>(exporter: E, resource: Resource, batch: LogBatchConfig) -> Self
    where
        E: opentelemetry_sdk::logs::LogExporter + 'static,
    {
        let processor = BatchLogProcessor::builder(exporter)
            .with_batch_config(batch.processor_config())
            .build();

        let provider = SdkLoggerProvider::builder()
            .with_resource(resource)
            .with_log_processor(processor)
            .build();

        Self { provider, batch }
    }

    /// Settings of the processor this handler feeds.
    pub fn batch_config(&self) -> LogBatchConfig {
        self.batch
    }

    /// A layer that forwards every event at TRACE and above, except those
    /// from the exporter's own dependencies.
    pub fn into_layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let filter = EXCLUDED_TARGETS
            .iter()
            .fold(Targets::new().with_default(LevelFilter::TRACE), |targets, target| {
                targets.with_target(*target, LevelFilter::OFF)
            });
        OpenTelemetryTracingBridge::new(&self.provider)
            .with_filter(filter)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::mpsc::{self, Receiver, SyncSender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use opentelemetry_sdk::error::OTelSdkResult;
    use opentelemetry_sdk::logs::{InMemoryLogExporter, LogBatch};
    use tracing_subscriber::layer::SubscriberExt;

    fn batch() -> LogBatchConfig {
        LogBatchConfig {
            max_queue_size: 5,
            max_export_batch_size: 1,
        }
    }

    #[test]
    fn test_disabled_provider_rejects_setup() {
        let mut config = TelemetryConfig::default();
        config.logs.enabled = false;

        let mut provider = LogProvider::new(&config);

        assert_eq!(provider.status(), &SignalStatus::Disabled);
        assert!(matches!(
            provider.setup_logging(),
            Err(TelemetryError::NotConfigured { signal: Signal::Logs, .. })
        ));
    }

    #[test]
    fn test_bridge_forwards_events_and_skips_exporter_stack() {
        let exporter = InMemoryLogExporter::default();
        let handler = LogHandler::from_exporter(exporter.clone(), Resource::builder().build(), batch());
        let provider = handler.provider.clone();

        let subscriber = tracing_subscriber::registry().with(handler.into_layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::trace!(task_id = 7, "Task created");
            tracing::info!(target: "hyper::proto::h1", "connection closed");
        });
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
    }

    /// Records the size of every batch. The first export blocks until
    /// released so the queue can be filled behind it.
    #[derive(Debug)]
    struct GatedExporter {
        batches: Arc<Mutex<Vec<usize>>>,
        entered: Mutex<Option<SyncSender<()>>>,
        release: Mutex<Receiver<()>>,
    }

    impl opentelemetry_sdk::logs::LogExporter for GatedExporter {
        fn export(&self, batch: LogBatch<'_>) -> impl Future<Output = OTelSdkResult> + Send {
            self.batches.lock().unwrap().push(batch.iter().count());
            if let Some(entered) = self.entered.lock().unwrap().take() {
                let _ = entered.send(());
                let _ = self.release.lock().unwrap().recv();
            }
            std::future::ready(Ok(()))
        }
    }

    #[test]
    fn test_processor_honours_queue_and_batch_sizes() {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::channel();
        let exporter = GatedExporter {
            batches: batches.clone(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        let handler = LogHandler::from_exporter(exporter, Resource::builder().build(), batch());
        let provider = handler.provider.clone();

        let subscriber = tracing_subscriber::registry().with(handler.into_layer());
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("first");
            entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            // the exporter is parked on the first record, so only the
            // queue capacity is accepted from these
            for i in 0..10 {
                tracing::info!(i, "queued");
            }
        });
        release_tx.send(()).unwrap();
        provider.force_flush().unwrap();

        let batches = batches.lock().unwrap();
        assert!(batches.iter().all(|&len| len == 1), "batches: {batches:?}");
        assert_eq!(batches.iter().sum::<usize>(), 1 + 5);
    }
}
