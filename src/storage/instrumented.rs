//! Client-side tracing for task stores.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use opentelemetry::metrics::Histogram;
use opentelemetry::trace::SpanKind;
use opentelemetry::{Context, KeyValue};

use super::{SharedStore, StoreError, Task, TaskStore, TASKS_TABLE};
use crate::telemetry::metrics::AppMeter;
use crate::telemetry::trace::SpanFactory;

pub const DB_DURATION_HISTOGRAM: &str = "db_client_operation_duration_seconds";

/// Wraps a store so every call emits a client span and a duration sample.
pub struct InstrumentedStore {
    inner: SharedStore,
    spans: SpanFactory,
    duration: Histogram<f64>,
}

impl InstrumentedStore {
    pub fn new(inner: SharedStore, spans: SpanFactory, meter: &AppMeter) -> Self {
        let duration = meter.create_histogram(
            DB_DURATION_HISTOGRAM,
            "Duration of task store operations",
            Some("s"),
        );
        Self {
            inner,
            spans,
            duration,
        }
    }

    async fn observe<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let span = self.spans.start_with_kind(
            format!("{operation} {TASKS_TABLE}"),
            SpanKind::Client,
            &Context::current(),
        );
        span.set_attributes([
            KeyValue::new("db.system", self.inner.system()),
            KeyValue::new("db.operation", operation),
            KeyValue::new("db.sql.table", TASKS_TABLE),
        ]);

        let started = Instant::now();
        let result = span.in_scope(call).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => {
                span.record_error(e);
                "error"
            }
        };
        self.duration.record(
            started.elapsed().as_secs_f64(),
            &[
                KeyValue::new("db.operation", operation),
                KeyValue::new("outcome", outcome),
            ],
        );
        result
    }
}

#[async_trait]
impl TaskStore for InstrumentedStore {
    fn system(&self) -> &'static str {
        self.inner.system()
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.observe("CREATE", self.inner.migrate()).await
    }

    async fn list(&self) -> Result<Vec<Task>, StoreError> {
        self.observe("SELECT", self.inner.list()).await
    }

    async fn create(&self, title: &str) -> Result<Task, StoreError> {
        self.observe("INSERT", self.inner.create(title)).await
    }

    async fn complete(&self, id: i64) -> Result<Option<Task>, StoreError> {
        self.observe("UPDATE", self.inner.complete(id)).await
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.observe("DELETE", self.inner.delete(id)).await
    }

    async fn execute_raw(&self, sql: &str) -> Result<(), StoreError> {
        let operation = sql
            .split_whitespace()
            .next()
            .map(|verb| verb.to_ascii_uppercase())
            .unwrap_or_default();
        let operation: &'static str = match operation.as_str() {
            "SELECT" => "SELECT",
            "INSERT" => "INSERT",
            "UPDATE" => "UPDATE",
            "DELETE" => "DELETE",
            _ => "EXECUTE",
        };
        self.observe(operation, self.inner.execute_raw(sql)).await
    }
}
