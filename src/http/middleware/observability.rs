//! Per-request counters, latency and access log.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::KeyValue;

use crate::http::metrics::TodoMetrics;

/// Count the request, run the handler, then record its latency and log it.
///
/// Handler panics are turned into 500 responses further in, so the
/// post-handler half always runs.
pub async fn observe_request(
    State(metrics): State<TodoMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    metrics.http_requests.add(
        1,
        &[
            KeyValue::new("method", method.clone()),
            KeyValue::new("endpoint", endpoint.clone()),
        ],
    );

    let response = next.run(request).await;

    let duration = started.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    metrics.http_request_duration.record(
        duration,
        &[
            KeyValue::new("method", method.clone()),
            KeyValue::new("status_code", status.to_string()),
            KeyValue::new("endpoint", endpoint),
        ],
    );

    tracing::info!(
        method = %method,
        path = %path,
        status_code = status,
        duration,
        user_agent = %user_agent,
        "{method} {path} - {status} - {duration:.3}s"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    use crate::http::response::panic_response;
    use crate::telemetry::AppMeter;

    async fn boom() -> &'static str {
        panic!("handler exploded")
    }

    fn router() -> Router {
        let metrics = TodoMetrics::new(&AppMeter::detached());
        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(metrics, observe_request))
    }

    #[tokio::test]
    async fn test_passes_response_through() {
        let response = router()
            .oneshot(HttpRequest::get("/ok").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_500() {
        let response = router()
            .oneshot(HttpRequest::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_unmatched_route_is_observed() {
        let response = router()
            .oneshot(HttpRequest::get("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    mod recorded {
        use std::collections::BTreeMap;
        use std::fmt;
        use std::sync::{Arc, Mutex};

        use axum::body::Body;
        use axum::http::{Request as HttpRequest, StatusCode};
        use axum::Router;
        use opentelemetry::KeyValue;
        use opentelemetry_sdk::metrics::data::{Histogram, ResourceMetrics, Sum};
        use opentelemetry_sdk::metrics::{InMemoryMetricExporter, PeriodicReader, SdkMeterProvider};
        use tower::ServiceExt;
        use tracing::field::{Field, Visit};
        use tracing::{Event, Subscriber};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::Layer;

        use crate::config::{ServerConfig, SimulationConfig};
        use crate::http::metrics::TodoMetrics;
        use crate::http::server::{AppState, HttpServer};
        use crate::storage::InMemoryTaskStore;
        use crate::telemetry::{AppMeter, ProfilerHandle, SignalStatus, SpanFactory};

        type Fields = BTreeMap<String, String>;

        #[derive(Clone, Default)]
        struct EventFields(Arc<Mutex<Vec<Fields>>>);

        struct FieldVisitor(Fields);

        impl Visit for FieldVisitor {
            fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                self.0.insert(field.name().to_string(), format!("{value:?}"));
            }

            fn record_str(&mut self, field: &Field, value: &str) {
                self.0.insert(field.name().to_string(), value.to_string());
            }
        }

        impl<S: Subscriber> Layer<S> for EventFields {
            fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
                let mut visitor = FieldVisitor(Fields::new());
                event.record(&mut visitor);
                self.0.lock().unwrap().push(visitor.0);
            }
        }

        fn router(provider: &SdkMeterProvider) -> Router {
            let state = AppState {
                store: Arc::new(InMemoryTaskStore::new()),
                metrics: TodoMetrics::new(&AppMeter::from_provider(provider.clone())),
                spans: SpanFactory::disabled(),
                profiler: ProfilerHandle::unconfigured(SignalStatus::Disabled),
                simulation: SimulationConfig::default(),
                service_name: Arc::from("todo-app"),
            };
            HttpServer::build_router(&ServerConfig::default(), state)
        }

        fn attributes(kvs: &[KeyValue]) -> BTreeMap<String, String> {
            kvs.iter()
                .map(|kv| (kv.key.as_str().to_string(), kv.value.as_str().to_string()))
                .collect()
        }

        fn counter_points(metrics: &[ResourceMetrics], name: &str) -> Vec<(BTreeMap<String, String>, u64)> {
            metrics
                .iter()
                .flat_map(|rm| rm.scope_metrics.iter())
                .flat_map(|sm| sm.metrics.iter())
                .filter(|m| m.name == name)
                .filter_map(|m| m.data.as_any().downcast_ref::<Sum<u64>>())
                .flat_map(|sum| sum.data_points.iter())
                .map(|point| (attributes(&point.attributes), point.value))
                .collect()
        }

        fn histogram_points(metrics: &[ResourceMetrics], name: &str) -> Vec<(BTreeMap<String, String>, u64)> {
            metrics
                .iter()
                .flat_map(|rm| rm.scope_metrics.iter())
                .flat_map(|sm| sm.metrics.iter())
                .filter(|m| m.name == name)
                .filter_map(|m| m.data.as_any().downcast_ref::<Histogram<f64>>())
                .flat_map(|histogram| histogram.data_points.iter())
                .map(|point| (attributes(&point.attributes), point.count))
                .collect()
        }

        fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        }

        #[tokio::test]
        async fn test_requests_are_counted_per_route_template() {
            let exporter = InMemoryMetricExporter::default();
            let provider = SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(exporter.clone()).build())
                .build();
            let events = EventFields::default();
            let subscriber = tracing_subscriber::registry().with(events.clone());
            let _guard = tracing::subscriber::set_default(subscriber);

            let app = router(&provider);
            let listed = app
                .clone()
                .oneshot(
                    HttpRequest::get("/api/tasks")
                        .header("user-agent", "todo-tests")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(listed.status(), StatusCode::OK);
            let missing_task = app
                .clone()
                .oneshot(
                    HttpRequest::post("/api/tasks/999/complete")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(missing_task.status(), StatusCode::NOT_FOUND);
            let unrouted = app
                .oneshot(HttpRequest::get("/missing").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(unrouted.status(), StatusCode::NOT_FOUND);

            provider.force_flush().unwrap();
            let metrics = exporter.get_finished_metrics().unwrap();

            let mut counted = counter_points(&metrics, "http_requests_total");
            counted.sort();
            assert_eq!(
                counted,
                vec![
                    (labels(&[("endpoint", "/api/tasks"), ("method", "GET")]), 1),
                    (
                        labels(&[("endpoint", "/api/tasks/{id}/complete"), ("method", "POST")]),
                        1
                    ),
                    (labels(&[("endpoint", "unknown"), ("method", "GET")]), 1),
                ]
            );

            let mut timed = histogram_points(&metrics, "http_request_duration_seconds");
            timed.sort();
            assert_eq!(
                timed,
                vec![
                    (
                        labels(&[
                            ("endpoint", "/api/tasks"),
                            ("method", "GET"),
                            ("status_code", "200")
                        ]),
                        1
                    ),
                    (
                        labels(&[
                            ("endpoint", "/api/tasks/{id}/complete"),
                            ("method", "POST"),
                            ("status_code", "404")
                        ]),
                        1
                    ),
                    (
                        labels(&[
                            ("endpoint", "unknown"),
                            ("method", "GET"),
                            ("status_code", "404")
                        ]),
                        1
                    ),
                ]
            );

            let access_logs: Vec<Fields> = events
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|fields| fields.contains_key("user_agent"))
                .cloned()
                .collect();
            assert_eq!(access_logs.len(), 3);
            let listed_log = &access_logs[0];
            for key in ["method", "path", "status_code", "duration", "user_agent", "message"] {
                assert!(listed_log.contains_key(key), "missing log field {key}");
            }
            assert_eq!(listed_log["method"], "GET");
            assert_eq!(listed_log["path"], "/api/tasks");
            assert_eq!(listed_log["status_code"], "200");
            assert_eq!(listed_log["user_agent"], "todo-tests");
            assert_eq!(access_logs[1]["path"], "/api/tasks/999/complete");
            assert_eq!(access_logs[2]["status_code"], "404");
        }
    }
}
