//! The most recently constructed metric provider becomes the process default.
//!
//! Kept in its own test binary so no other test installs providers
//! concurrently.

use todo_otel::config::TelemetryConfig;
use todo_otel::telemetry::global::{installed_meter_provider_id, installed_tracer_provider_id};
use todo_otel::telemetry::{MetricProvider, TraceProvider};

#[test]
fn test_second_provider_replaces_the_default() {
    let mut config = TelemetryConfig::for_service("todo-app");
    config.profiling.enabled = false;

    let first = MetricProvider::new(&config);
    assert_eq!(installed_meter_provider_id(), Some(first.id()));

    let second = MetricProvider::new(&config);
    assert_ne!(first.id(), second.id());
    assert_eq!(installed_meter_provider_id(), Some(second.id()));

    // Both meters stay usable after the swap.
    let first_meter = first.meter().expect("first provider configured");
    let second_meter = second.meter().expect("second provider configured");
    first_meter
        .create_counter("tasks_total", "Tasks created", None)
        .add(1, &[]);
    second_meter
        .create_histogram("operation_duration_seconds", "Operation duration", Some("s"))
        .record(0.25, &[]);

    let traces = TraceProvider::new(&config);
    assert_eq!(installed_tracer_provider_id(), Some(traces.id()));

    let _ = traces.shutdown();
    let _ = first.shutdown();
    let _ = second.shutdown();
}
