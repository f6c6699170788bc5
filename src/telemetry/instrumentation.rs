//! Automatic instrumentation of the web framework and the database driver.
//!
//! # Design Decisions
//! - Each library is handled by an [`Instrumentor`]; the registry owns one
//!   per library and records the names of those that succeeded
//! - A failing instrumentor is logged and skipped, and the target is
//!   returned untouched, so one broken hook never blocks the others
//! - The registry is only mutated during startup, before traffic

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::SpanKind;
use opentelemetry::KeyValue;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::storage::{InstrumentedStore, SharedStore};
use crate::telemetry::metrics::AppMeter;
use crate::telemetry::trace::SpanFactory;

pub const FRAMEWORK_LIBRARY: &str = "axum";
pub const DB_DRIVER_LIBRARY: &str = "sqlx";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to instrument {library}: {reason}")]
pub struct InstrumentationError {
    pub library: &'static str,
    pub reason: String,
}

/// Applies instrumentation for one library to a target of type `T`.
pub trait Instrumentor<T>: Send + Sync {
    /// Name recorded when instrumentation succeeds.
    fn library(&self) -> &'static str;

    fn instrument(&self, target: T) -> Result<T, InstrumentationError>;
}

/// Adds a server span per request plus `tower-http` request tracing.
pub struct AxumInstrumentor {
    spans: SpanFactory,
}

impl AxumInstrumentor {
    pub fn new(spans: SpanFactory) -> Self {
        Self { spans }
    }
}

impl Instrumentor<Router> for AxumInstrumentor {
    fn library(&self) -> &'static str {
        FRAMEWORK_LIBRARY
    }

    fn instrument(&self, router: Router) -> Result<Router, InstrumentationError> {
        Ok(router
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(self.spans.clone(), server_span)))
    }
}

/// Wraps the store so each call is traced as a database client operation.
pub struct SqlxInstrumentor {
    spans: SpanFactory,
    meter: AppMeter,
}

impl SqlxInstrumentor {
    pub fn new(spans: SpanFactory, meter: AppMeter) -> Self {
        Self { spans, meter }
    }
}

impl Instrumentor<SharedStore> for SqlxInstrumentor {
    fn library(&self) -> &'static str {
        DB_DRIVER_LIBRARY
    }

    fn instrument(&self, store: SharedStore) -> Result<SharedStore, InstrumentationError> {
        Ok(Arc::new(InstrumentedStore::new(
            store,
            self.spans.clone(),
            &self.meter,
        )))
    }
}

/// Tracks which libraries have been instrumented.
pub struct InstrumentationRegistry {
    framework: Box<dyn Instrumentor<Router>>,
    db_driver: Box<dyn Instrumentor<SharedStore>>,
    applied: Vec<&'static str>,
}

impl InstrumentationRegistry {
    pub fn new(spans: SpanFactory, meter: AppMeter) -> Self {
        Self::with_instrumentors(
            Box::new(AxumInstrumentor::new(spans.clone())),
            Box::new(SqlxInstrumentor::new(spans, meter)),
        )
    }

    pub fn with_instrumentors(
        framework: Box<dyn Instrumentor<Router>>,
        db_driver: Box<dyn Instrumentor<SharedStore>>,
    ) -> Self {
        Self {
            framework,
            db_driver,
            applied: Vec::new(),
        }
    }

    pub fn instrument_framework(&mut self, router: Router) -> Router {
        apply(self.framework.as_ref(), &mut self.applied, router)
    }

    pub fn instrument_db_driver(&mut self, store: SharedStore) -> SharedStore {
        apply(self.db_driver.as_ref(), &mut self.applied, store)
    }

    /// Instrument the database driver, then the framework when a router is
    /// supplied.
    pub fn instrument_all(
        &mut self,
        store: SharedStore,
        router: Option<Router>,
    ) -> (SharedStore, Option<Router>) {
        let store = self.instrument_db_driver(store);
        let router = router.map(|router| self.instrument_framework(router));
        (store, router)
    }

    /// Libraries instrumented successfully, in the order they were applied.
    pub fn instrumented_libraries(&self) -> &[&'static str] {
        &self.applied
    }
}

fn apply<T: Clone>(
    instrumentor: &dyn Instrumentor<T>,
    applied: &mut Vec<&'static str>,
    target: T,
) -> T {
    let library = instrumentor.library();
    if applied.contains(&library) {
        tracing::debug!(library, "Already instrumented");
        return target;
    }

    match instrumentor.instrument(target.clone()) {
        Ok(instrumented) => {
            applied.push(library);
            tracing::info!(library, "Instrumentation applied");
            instrumented
        }
        Err(e) => {
            tracing::warn!(library, error = %e, "Instrumentation failed, continuing without it");
            target
        }
    }
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|name| name.as_str()).collect()
    }
}

async fn server_span(State(spans): State<SpanFactory>, request: Request, next: Next) -> Response {
    let parent = TraceContextPropagator::new().extract(&HeaderExtractor(request.headers()));
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let span = spans.start_with_kind(format!("{method} {route}"), SpanKind::Server, &parent);
    span.set_attributes([
        KeyValue::new("http.request.method", method),
        KeyValue::new("http.route", route),
        KeyValue::new("url.path", request.uri().path().to_string()),
    ]);

    let response = span.in_scope(next.run(request)).await;

    let status = response.status();
    span.set_attribute(KeyValue::new(
        "http.response.status_code",
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.mark_error(format!("HTTP {}", status.as_u16()));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTaskStore;

    struct Failing;

    impl Instrumentor<Router> for Failing {
        fn library(&self) -> &'static str {
            FRAMEWORK_LIBRARY
        }

        fn instrument(&self, _router: Router) -> Result<Router, InstrumentationError> {
            Err(InstrumentationError {
                library: FRAMEWORK_LIBRARY,
                reason: "hook rejected the application".to_string(),
            })
        }
    }

    fn store() -> SharedStore {
        Arc::new(InMemoryTaskStore::new())
    }

    #[test]
    fn test_instrument_all_without_router_skips_framework() {
        let mut registry =
            InstrumentationRegistry::new(SpanFactory::disabled(), AppMeter::detached());

        let (_, router) = registry.instrument_all(store(), None);

        assert!(router.is_none());
        assert_eq!(registry.instrumented_libraries(), &[DB_DRIVER_LIBRARY]);
    }

    #[test]
    fn test_failing_framework_leaves_driver_instrumented() {
        let spans = SpanFactory::disabled();
        let mut registry = InstrumentationRegistry::with_instrumentors(
            Box::new(Failing),
            Box::new(SqlxInstrumentor::new(spans, AppMeter::detached())),
        );

        let (_, router) = registry.instrument_all(store(), Some(Router::new()));

        assert!(router.is_some());
        assert_eq!(registry.instrumented_libraries(), &[DB_DRIVER_LIBRARY]);
    }

    #[test]
    fn test_library_is_recorded_once() {
        let mut registry =
            InstrumentationRegistry::new(SpanFactory::disabled(), AppMeter::detached());

        let store = registry.instrument_db_driver(store());
        registry.instrument_db_driver(store);

        assert_eq!(registry.instrumented_libraries(), &[DB_DRIVER_LIBRARY]);
    }

    #[test]
    fn test_header_extractor_reads_traceparent() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".parse().unwrap(),
        );

        let extractor = HeaderExtractor(&headers);

        assert!(extractor.get("traceparent").is_some());
        assert_eq!(extractor.keys(), vec!["traceparent"]);
    }

    #[tokio::test]
    async fn test_handler_runs_inside_server_span() {
        use axum::body::Body;
        use axum::http::Request as HttpRequest;
        use axum::routing::get;
        use opentelemetry::trace::{TraceContextExt, TracerProvider as _};
        use opentelemetry::Context;
        use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
        use tower::ServiceExt;

        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let spans = SpanFactory::from_tracer(provider.tracer("test"));

        let router = Router::new().route(
            "/trace",
            get(|| async {
                let cx = Context::current();
                let span = cx.span();
                let span_cx = span.span_context();
                format!("{}:{}", span_cx.trace_id(), span_cx.span_id())
            }),
        );
        let router = AxumInstrumentor::new(spans).instrument(router).unwrap();

        let response = router
            .oneshot(
                HttpRequest::get("/trace")
                    .header(
                        "traceparent",
                        "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let seen = String::from_utf8(body.to_vec()).unwrap();

        let finished = exporter.get_finished_spans().unwrap();
        let server = finished.iter().find(|s| s.name == "GET /trace").unwrap();
        assert_eq!(
            seen,
            format!(
                "{}:{}",
                server.span_context.trace_id(),
                server.span_context.span_id()
            )
        );
        assert_eq!(
            server.span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }
}
