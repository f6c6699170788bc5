//! Application instruments.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by method, endpoint
//! - `http_request_duration_seconds` (histogram): latency by method, status_code, endpoint
//! - `db_operations_total` (counter): store calls by operation, table
//! - `errors_total` (counter): failures by operation, error_type
//! - `tasks_total` / `tasks_completed_total` (counters): task lifecycle
//! - `operation_duration_seconds` (histogram): handler work by operation

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;

use crate::telemetry::AppMeter;

#[derive(Clone)]
pub struct TodoMetrics {
    pub http_requests: Counter<u64>,
    pub http_request_duration: Histogram<f64>,
    pub db_operations: Counter<u64>,
    pub errors: Counter<u64>,
    pub tasks_created: Counter<u64>,
    pub tasks_completed: Counter<u64>,
    pub operation_duration: Histogram<f64>,
}

impl TodoMetrics {
    pub fn new(meter: &AppMeter) -> Self {
        Self {
            http_requests: meter.create_counter("http_requests_total", "Total HTTP requests", None),
            http_request_duration: meter.create_histogram(
                "http_request_duration_seconds",
                "HTTP request response time",
                None,
            ),
            db_operations: meter.create_counter(
                "db_operations_total",
                "Total database operations",
                None,
            ),
            errors: meter.create_counter("errors_total", "Total application errors", None),
            tasks_created: meter.create_counter("tasks_total", "Total tasks created", Some("1")),
            tasks_completed: meter.create_counter(
                "tasks_completed_total",
                "Total tasks completed",
                Some("1"),
            ),
            operation_duration: meter.create_histogram(
                "operation_duration_seconds",
                "Operation duration in seconds",
                Some("s"),
            ),
        }
    }

    pub fn record_db_operation(&self, operation: &'static str) {
        self.db_operations.add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("table", crate::storage::TASKS_TABLE),
            ],
        );
    }

    pub fn record_error(&self, operation: &'static str, error_type: &str) {
        self.errors.add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("error_type", error_type.to_string()),
            ],
        );
    }
}
