//! Trace pipeline and scoped spans.

use std::borrow::Cow;
use std::future::Future;

use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::trace::{BatchSpanProcessor, Sampler, SdkTracerProvider};

use crate::config::TelemetryConfig;
use crate::telemetry::endpoint::Endpoint;
use crate::telemetry::error::{Signal, SignalStatus, TelemetryError};
use crate::telemetry::global;
use crate::telemetry::resource::ResourceDescriptor;

/// Concrete tracer handed out by the SDK provider.
pub type AppTracer = <SdkTracerProvider as opentelemetry::trace::TracerProvider>::Tracer;

pub const INSTRUMENTATION_SCOPE: &str = "todo-otel";

/// Owns the batching span pipeline for the process.
pub struct TraceProvider {
    id: u64,
    provider: SdkTracerProvider,
    status: SignalStatus,
    endpoint: Endpoint,
}

impl TraceProvider {
    /// Build the pipeline and install it as the global tracer provider.
    ///
    /// Never fails: an unusable configuration produces a provider whose spans
    /// are sampled out, and the reason is kept in [`TraceProvider::status`].
    pub fn new(config: &TelemetryConfig) -> Self {
        let id = global::next_provider_id();
        let endpoint = Endpoint::resolve(config, Signal::Traces);

        if !config.traces.enabled {
            return Self::inert(id, endpoint, SignalStatus::Disabled);
        }

        match build_provider(config, &endpoint) {
            Ok(provider) => {
                global::install_tracer_provider(id, &provider);
                tracing::debug!(provider_id = id, endpoint = endpoint.url(), "Trace pipeline ready");
                Self {
                    id,
                    provider,
                    status: SignalStatus::Ready,
                    endpoint,
                }
            }
            Err(e) => Self::inert(id, endpoint, SignalStatus::degraded(&e)),
        }
    }

    fn inert(id: u64, endpoint: Endpoint, status: SignalStatus) -> Self {
        let provider = inert_provider();
        Self {
            id,
            provider,
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

    pub fn tracer(&self) -> AppTracer {
        self.provider.tracer(INSTRUMENTATION_SCOPE)
    }

    pub fn spans(&self) -> SpanFactory {
        SpanFactory {
            tracer: self.tracer(),
        }
    }

    /// Flush buffered spans and stop the exporter.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if !self.status.is_ready() {
            return Ok(());
        }
        self.provider
            .shutdown()
            .map_err(|e| TelemetryError::Exporter {
                signal: Signal::Traces,
                reason: e.to_string(),
            })
    }
}

fn inert_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOff)
        .build()
}

fn build_provider(
    config: &TelemetryConfig,
    endpoint: &Endpoint,
) -> Result<SdkTracerProvider, TelemetryError> {
    let descriptor = ResourceDescriptor::from_config(config)?;
    endpoint.validate(Signal::Traces)?;

    let mut builder = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary);
    if endpoint.is_explicit() {
        builder = builder.with_endpoint(endpoint.url());
    }
    let exporter = builder.build().map_err(|e| TelemetryError::Exporter {
        signal: Signal::Traces,
        reason: e.to_string(),
    })?;

    Ok(SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_sampler(Sampler::TraceIdRatioBased(config.traces.sampling_ratio))
        .with_resource(descriptor.resource())
        .build())
}

/// Cheap, cloneable handle for opening spans.
#[derive(Clone)]
pub struct SpanFactory {
    tracer: AppTracer,
}

impl SpanFactory {
    pub fn from_tracer(tracer: AppTracer) -> Self {
        Self { tracer }
    }

    /// Factory whose spans are never sampled.
    pub fn disabled() -> Self {
        Self {
            tracer: inert_provider().tracer(INSTRUMENTATION_SCOPE),
        }
    }

    /// Open a span under whatever context is current.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> ScopedSpan {
        self.start_with_kind(name, SpanKind::Internal, &Context::current())
    }

    pub fn start_child(&self, name: impl Into<Cow<'static, str>>, parent: &Context) -> ScopedSpan {
        self.start_with_kind(name, SpanKind::Internal, parent)
    }

    pub fn start_with_kind(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: &Context,
    ) -> ScopedSpan {
        let span = self
            .tracer
            .span_builder(name)
            .with_kind(kind)
            .start_with_context(&self.tracer, parent);
        ScopedSpan {
            cx: parent.with_span(span),
        }
    }
}

/// An open span that is ended when dropped.
///
/// Dropping covers every exit path: normal return, `?` propagation and
/// unwinding.
pub struct ScopedSpan {
    cx: Context,
}

impl ScopedSpan {
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn set_attributes(&self, attributes: impl IntoIterator<Item = KeyValue>) {
        let span = self.cx.span();
        for attribute in attributes {
            span.set_attribute(attribute);
        }
    }

    pub fn record_error(&self, error: &dyn std::error::Error) {
        let span = self.cx.span();
        span.record_error(error);
        span.set_status(Status::error(error.to_string()));
    }

    /// Mark the span failed without an error value at hand.
    pub fn mark_error(&self, description: impl Into<Cow<'static, str>>) {
        self.cx.span().set_status(Status::error(description));
    }

    pub fn record_success(&self) {
        self.cx.span().set_status(Status::Ok);
    }

    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Context carrying this span, for parenting children explicitly.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Poll `future` with this span as the current context.
    ///
    /// The context is attached around every poll, so the span stays current
    /// even when the task is moved between worker threads.
    pub async fn in_scope<F: Future>(&self, future: F) -> F::Output {
        let mut future = std::pin::pin!(future);
        std::future::poll_fn(|task_cx| {
            let _guard = self.cx.clone().attach();
            future.as_mut().poll(task_cx)
        })
        .await
    }
}

impl Drop for ScopedSpan {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}
