//! Synthetic traffic against a running to-do service.
//!
//! # Modes
//! - normal: list, create a few tasks, maybe complete or delete one
//! - errors: one or two fault-injection requests
//! - continuous: normal and error workflows (70/30) until a deadline
//! - burst: concurrent batches of creates and fault injections
//!
//! Pauses between requests are scaled by [`Pacing`], so tests can run the
//! same workflows without sleeping.

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::storage::Task;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001";

const SAMPLE_TASKS: &[&str] = &[
    "Build the metrics dashboard",
    "Configure alerting rules",
    "Document the service architecture",
    "Review application error logs",
    "Optimize database queries",
    "Cache frequent queries",
    "Configure automatic backups",
    "Update project dependencies",
    "Write integration tests",
    "Set up the CI/CD pipeline",
    "Review application security",
    "Add rate limiting",
    "Monitor network traffic",
    "Shrink container images",
    "Add health checks",
];

pub const ERROR_TYPES: &[&str] = &["db", "timeout", "500", "slow"];
const BURST_ERROR_TYPES: &[&str] = &["db", "500", "slow"];

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{operation} returned {status}")]
    UnexpectedStatus {
        operation: &'static str,
        status: StatusCode,
    },

    #[error("service at {0} is not healthy")]
    Unhealthy(String),
}

/// Scale applied to the random pauses between requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    scale: f64,
}

impl Pacing {
    pub fn realtime() -> Self {
        Self { scale: 1.0 }
    }

    /// No pauses at all.
    pub fn immediate() -> Self {
        Self { scale: 0.0 }
    }

    pub fn scaled(scale: f64) -> Self {
        Self {
            scale: scale.max(0.0),
        }
    }

    fn pause_between(&self, min_ms: u64, max_ms: u64) -> Duration {
        if self.scale == 0.0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        Duration::from_millis(ms).mul_f64(self.scale)
    }

    async fn pause(&self, min_ms: u64, max_ms: u64) {
        let pause = self.pause_between(min_ms, max_ms);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::realtime()
    }
}

/// What a fault-injection request came back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// The service answered with a 5xx, as intended.
    ServerError(StatusCode),
    /// The service answered without failing.
    Responded { status: StatusCode, message: String },
    /// The client gave up waiting.
    TimedOut,
}

/// Tally of one simulation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    pub workflows: u64,
    pub requests: u64,
    pub failed_requests: u64,
    pub tasks_created: u64,
    pub tasks_completed: u64,
    pub tasks_deleted: u64,
    pub errors_simulated: u64,
    pub elapsed: Duration,
}

impl SimulationReport {
    fn record<T>(&mut self, result: &Result<T, SimulatorError>) {
        self.requests += 1;
        if let Err(e) = result {
            self.failed_requests += 1;
            tracing::warn!(error = %e, "Request failed");
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    message: Option<String>,
    error: Option<String>,
}

/// HTTP client driving the to-do API.
#[derive(Clone)]
pub struct TrafficSimulator {
    client: reqwest::Client,
    base_url: String,
    pacing: Pacing,
}

impl TrafficSimulator {
    pub fn new(base_url: impl Into<String>, pacing: Pacing) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pacing,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn check_health(&self) -> bool {
        match self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                tracing::error!(url = %self.base_url, error = %e, "Service is not reachable");
                false
            }
        }
    }

    pub async fn create_random_task(&self) -> Result<Task, SimulatorError> {
        let title = SAMPLE_TASKS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or("Untitled task");

        let response = self
            .client
            .post(self.url("/api/tasks"))
            .json(&json!({ "title": title }))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            return Err(SimulatorError::UnexpectedStatus {
                operation: "create task",
                status: response.status(),
            });
        }

        let task: Task = response.json().await?;
        tracing::info!(task_id = task.id, title = %task.title, "Task created");
        Ok(task)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, SimulatorError> {
        let response = self
            .client
            .get(self.url("/api/tasks"))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SimulatorError::UnexpectedStatus {
                operation: "list tasks",
                status: response.status(),
            });
        }

        let tasks: Vec<Task> = response.json().await?;
        tracing::info!(count = tasks.len(), "Listed tasks");
        Ok(tasks)
    }

    /// Complete one of the open tasks. `None` when every task is done.
    pub async fn complete_random_task(&self, tasks: &[Task]) -> Result<Option<i64>, SimulatorError> {
        let open: Vec<&Task> = tasks.iter().filter(|t| !t.completed).collect();
        let Some(task_id) = open.choose(&mut rand::thread_rng()).map(|t| t.id) else {
            return Ok(None);
        };

        let response = self
            .client
            .post(self.url(&format!("/api/tasks/{task_id}/complete")))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SimulatorError::UnexpectedStatus {
                operation: "complete task",
                status: response.status(),
            });
        }

        tracing::info!(task_id, "Task completed");
        Ok(Some(task_id))
    }

    /// Delete one of `tasks`. `None` when the list is empty.
    pub async fn delete_random_task(&self, tasks: &[Task]) -> Result<Option<i64>, SimulatorError> {
        let Some(task_id) = tasks.choose(&mut rand::thread_rng()).map(|t| t.id) else {
            return Ok(None);
        };

        let response = self
            .client
            .delete(self.url(&format!("/api/tasks/{task_id}")))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(SimulatorError::UnexpectedStatus {
                operation: "delete task",
                status: response.status(),
            });
        }

        tracing::info!(task_id, "Task deleted");
        Ok(Some(task_id))
    }

    pub async fn simulate_error(&self, error_type: &str) -> Result<ErrorOutcome, SimulatorError> {
        tracing::info!(error_type, "Simulating error");
        let sent = self
            .client
            .post(self.url(&format!("/api/simulate-error/{error_type}")))
            .timeout(Duration::from_secs(15))
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                tracing::info!(error_type, "Simulated timeout hit the client deadline");
                return Ok(ErrorOutcome::TimedOut);
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        if status.is_server_error() {
            tracing::info!(error_type, status = status.as_u16(), "Simulated error returned");
            return Ok(ErrorOutcome::ServerError(status));
        }

        let body: MessageBody = response.json().await?;
        let message = body.message.or(body.error).unwrap_or_default();
        tracing::info!(error_type, status = status.as_u16(), message = %message, "Simulation answered");
        Ok(ErrorOutcome::Responded { status, message })
    }

    /// List, create one to three tasks, list again, then maybe complete
    /// (70%) and maybe delete (30%) a task.
    pub async fn normal_workflow(&self, report: &mut SimulationReport) {
        report.workflows += 1;

        let listed = self.list_tasks().await;
        report.record(&listed);

        let creates = rand::thread_rng().gen_range(1..=3);
        for _ in 0..creates {
            let created = self.create_random_task().await;
            report.record(&created);
            if created.is_ok() {
                report.tasks_created += 1;
            }
            self.pacing.pause(500, 2000).await;
        }

        let tasks = self.list_tasks().await;
        report.record(&tasks);
        let tasks = tasks.unwrap_or_default();
        if tasks.is_empty() {
            return;
        }

        let (complete, delete) = {
            let mut rng = rand::thread_rng();
            (rng.gen_bool(0.7), rng.gen_bool(0.3))
        };
        if complete {
            let completed = self.complete_random_task(&tasks).await;
            report.record(&completed);
            if matches!(completed, Ok(Some(_))) {
                report.tasks_completed += 1;
            }
        }
        if delete {
            let deleted = self.delete_random_task(&tasks).await;
            report.record(&deleted);
            if matches!(deleted, Ok(Some(_))) {
                report.tasks_deleted += 1;
            }
        }
    }

    /// Fire one or two distinct fault-injection requests.
    pub async fn error_workflow(&self, report: &mut SimulationReport) {
        report.workflows += 1;

        let selected: Vec<&str> = {
            let mut rng = rand::thread_rng();
            let count = rng.gen_range(1..=2);
            ERROR_TYPES.choose_multiple(&mut rng, count).copied().collect()
        };

        for error_type in selected {
            let outcome = self.simulate_error(error_type).await;
            report.record(&outcome);
            if outcome.is_ok() {
                report.errors_simulated += 1;
            }
            self.pacing.pause(1000, 3000).await;
        }
    }

    /// Alternate workflows until `duration` has passed.
    pub async fn continuous(&self, duration: Duration) -> Result<SimulationReport, SimulatorError> {
        if !self.check_health().await {
            return Err(SimulatorError::Unhealthy(self.base_url.clone()));
        }

        let started = Instant::now();
        let mut report = SimulationReport::default();
        while started.elapsed() < duration {
            let normal = rand::thread_rng().gen_bool(0.7);
            if normal {
                self.normal_workflow(&mut report).await;
            } else {
                self.error_workflow(&mut report).await;
            }
            self.pacing.pause(2000, 8000).await;
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            elapsed_secs = report.elapsed.as_secs_f64(),
            workflows = report.workflows,
            requests = report.requests,
            failed = report.failed_requests,
            "Continuous simulation finished"
        );
        Ok(report)
    }

    /// Send `bursts` batches of `requests_per_burst` concurrent requests.
    /// Every third request in a batch injects a fault.
    pub async fn burst(
        &self,
        requests_per_burst: usize,
        bursts: usize,
    ) -> Result<SimulationReport, SimulatorError> {
        if !self.check_health().await {
            return Err(SimulatorError::Unhealthy(self.base_url.clone()));
        }

        let started = Instant::now();
        let mut report = SimulationReport::default();
        for burst in 0..bursts {
            tracing::info!(burst = burst + 1, total = bursts, "Starting burst");

            let error_types: Vec<&str> = {
                let mut rng = rand::thread_rng();
                (0..requests_per_burst)
                    .map(|_| BURST_ERROR_TYPES.choose(&mut rng).copied().unwrap_or("500"))
                    .collect()
            };

            let requests = (0..requests_per_burst).map(|i| {
                let error_type = error_types[i];
                async move {
                    if i % 3 == 0 {
                        self.simulate_error(error_type).await.map(|_| false)
                    } else {
                        self.create_random_task().await.map(|_| true)
                    }
                }
            });

            for result in join_all(requests).await {
                report.record(&result);
                match result {
                    Ok(true) => report.tasks_created += 1,
                    Ok(false) => report.errors_simulated += 1,
                    Err(_) => {}
                }
            }

            if burst + 1 < bursts {
                self.pacing.pause(5000, 5000).await;
            }
        }

        report.elapsed = started.elapsed();
        tracing::info!(
            requests = report.requests,
            failed = report.failed_requests,
            "Burst test finished"
        );
        Ok(report)
    }
}
