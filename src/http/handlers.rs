//! Route handlers.
//!
//! Every data operation runs inside a span and a profiler tag scope, counts
//! the store call and records its duration. Failures are counted in
//! `errors_total` and answered with a JSON 500.

use std::future::Future;
use std::time::{Duration, Instant};

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use opentelemetry::KeyValue;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::storage::{StoreError, Task};
use crate::telemetry::ScopedSpan;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Run a store call under the span and an `operation` profile tag, and
/// record how long it took.
async fn timed<T, F>(
    state: &AppState,
    span: &ScopedSpan,
    operation: &'static str,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    let started = Instant::now();
    let result = state
        .profiler
        .in_scope(&[("operation", operation)], span.in_scope(call))
        .await;
    state.metrics.operation_duration.record(
        started.elapsed().as_secs_f64(),
        &[KeyValue::new("operation", operation)],
    );
    result
}

fn store_failure(state: &AppState, span: &ScopedSpan, operation: &'static str, error: &StoreError) -> ApiError {
    span.set_attribute(KeyValue::new("success", false));
    span.set_attribute(KeyValue::new("error", error.to_string()));
    span.record_error(error);
    state.metrics.record_error(operation, "database");
    tracing::error!(operation, error = %error, "Store operation failed");
    ApiError::internal()
}

fn task_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected task id");
            Err(ApiError::BadRequest("Invalid task id".to_string()))
        }
    }
}

fn rejected(span: &ScopedSpan, reason: &'static str) {
    span.set_attribute(KeyValue::new("success", false));
    span.set_attribute(KeyValue::new("error", reason));
}

pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let span = state.spans.start("get_tasks");

    match timed(&state, &span, "list_tasks", state.store.list()).await {
        Ok(tasks) => {
            state.metrics.record_db_operation("select");
            span.set_attributes([
                KeyValue::new("tasks_count", tasks.len() as i64),
                KeyValue::new("success", true),
            ]);
            tracing::info!(count = tasks.len(), "Listed tasks");
            Ok(Json(tasks))
        }
        Err(e) => Err(store_failure(&state, &span, "get_tasks", &e)),
    }
}

pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let span = state.spans.start("create_task");

    let title = payload
        .ok()
        .and_then(|Json(body)| body.title)
        .map(|title| title.trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        rejected(&span, "missing_title");
        return Err(ApiError::BadRequest("Title is required".to_string()));
    }

    match timed(&state, &span, "create_task", state.store.create(&title)).await {
        Ok(task) => {
            state.metrics.record_db_operation("insert");
            state
                .metrics
                .tasks_created
                .add(1, &[KeyValue::new("operation", "created")]);
            span.set_attributes([
                KeyValue::new("task_id", task.id),
                KeyValue::new("success", true),
            ]);
            span.record_success();
            tracing::info!(task_id = task.id, title = %title, "Task created");
            Ok((StatusCode::CREATED, Json(task)))
        }
        Err(e) => Err(store_failure(&state, &span, "create_task", &e)),
    }
}

pub async fn complete_task(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Task>, ApiError> {
    let task_id = task_id(path)?;
    let span = state.spans.start("complete_task");

    match timed(&state, &span, "complete_task", state.store.complete(task_id)).await {
        Ok(Some(task)) => {
            state.metrics.record_db_operation("update");
            state
                .metrics
                .tasks_completed
                .add(1, &[KeyValue::new("operation", "completed")]);
            span.set_attributes([
                KeyValue::new("task_id", task_id),
                KeyValue::new("success", true),
            ]);
            span.record_success();
            tracing::info!(task_id, "Task completed");
            Ok(Json(task))
        }
        Ok(None) => {
            rejected(&span, "task_not_found");
            Err(ApiError::NotFound("Task not found".to_string()))
        }
        Err(e) => Err(store_failure(&state, &span, "complete_task", &e)),
    }
}

pub async fn delete_task(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task_id = task_id(path)?;
    let span = state.spans.start("delete_task");

    match timed(&state, &span, "delete_task", state.store.delete(task_id)).await {
        Ok(true) => {
            state.metrics.record_db_operation("delete");
            span.set_attributes([
                KeyValue::new("task_id", task_id),
                KeyValue::new("success", true),
            ]);
            span.record_success();
            tracing::info!(task_id, "Task deleted");
            Ok(Json(json!({ "message": "Task deleted successfully" })))
        }
        Ok(false) => {
            rejected(&span, "task_not_found");
            Err(ApiError::NotFound("Task not found".to_string()))
        }
        Err(e) => Err(store_failure(&state, &span, "delete_task", &e)),
    }
}

/// Fault injection for demos: `db`, `timeout`, `500` and `slow`.
pub async fn simulate_error(
    State(state): State<AppState>,
    Path(error_type): Path<String>,
) -> Response {
    let span = state.spans.start("simulate_error");
    span.set_attribute(KeyValue::new("error_type", error_type.clone()));

    let failure = match error_type.as_str() {
        "db" => match span
            .in_scope(state.store.execute_raw("SELECT * FROM nonexistent_table"))
            .await
        {
            Ok(()) => return Json(json!({ "message": "Query unexpectedly succeeded" })).into_response(),
            Err(e) => e.to_string(),
        },
        "timeout" => {
            span.in_scope(tokio::time::sleep(Duration::from_secs(state.simulation.timeout_secs)))
                .await;
            return Json(json!({ "message": "Timeout simulation finished" })).into_response();
        }
        "500" => "Intentionally simulated failure".to_string(),
        "slow" => {
            let delay_ms = rand::thread_rng()
                .gen_range(state.simulation.slow_min_ms..=state.simulation.slow_max_ms);
            state
                .profiler
                .in_scope(
                    &[("operation", "slow_operation")],
                    span.in_scope(tokio::time::sleep(Duration::from_millis(delay_ms))),
                )
                .await;
            span.set_attributes([
                KeyValue::new("slow_operation", true),
                KeyValue::new("sleep_time_ms", delay_ms as i64),
            ]);
            tracing::warn!(delay_ms, "Slow operation simulated");
            return Json(json!({ "message": "Slow operation completed" })).into_response();
        }
        _ => {
            return ApiError::BadRequest("Unknown error type".to_string()).into_response();
        }
    };

    span.set_attribute(KeyValue::new("success", false));
    span.set_attribute(KeyValue::new("error", failure.clone()));
    span.mark_error(failure.clone());
    state.metrics.errors.add(
        1,
        &[
            KeyValue::new("operation", "simulate_error"),
            KeyValue::new("error_type", error_type.clone()),
            KeyValue::new("simulated", "true"),
        ],
    );
    tracing::error!(error_type = %error_type, error = %failure, "Simulated error");
    ApiError::Internal(format!("Simulated error: {failure}")).into_response()
}

pub async fn health(State(state): State<AppState>) -> Response {
    match state.store.execute_raw("SELECT 1").await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "timestamp": Utc::now().to_rfc3339(),
            "service": state.service_name.as_ref(),
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}
