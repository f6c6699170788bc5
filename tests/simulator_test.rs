//! Traffic simulator workflows against a live in-process server.

use std::time::Duration;

use todo_otel::simulator::{ErrorOutcome, Pacing, SimulationReport, SimulatorError, TrafficSimulator};

mod common;

#[tokio::test]
async fn test_health_check() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());
    assert!(simulator.check_health().await);

    app.store.set_available(false);
    assert!(!simulator.check_health().await);
}

#[tokio::test]
async fn test_unreachable_service_is_unhealthy() {
    // Bind then drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let simulator = TrafficSimulator::new(format!("http://{addr}"), Pacing::immediate());
    assert!(matches!(
        simulator.continuous(Duration::from_millis(10)).await,
        Err(SimulatorError::Unhealthy(_))
    ));
}

#[tokio::test]
async fn test_task_operations() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    let created = simulator.create_random_task().await.unwrap();
    let tasks = simulator.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);

    assert_eq!(simulator.complete_random_task(&tasks).await.unwrap(), Some(created.id));

    // Nothing left to complete.
    let tasks = simulator.list_tasks().await.unwrap();
    assert_eq!(simulator.complete_random_task(&tasks).await.unwrap(), None);

    assert_eq!(simulator.delete_random_task(&tasks).await.unwrap(), Some(created.id));
    assert_eq!(simulator.delete_random_task(&[]).await.unwrap(), None);
}

#[tokio::test]
async fn test_simulate_error_outcomes() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    assert!(matches!(
        simulator.simulate_error("500").await.unwrap(),
        ErrorOutcome::ServerError(status) if status.as_u16() == 500
    ));
    assert!(matches!(
        simulator.simulate_error("slow").await.unwrap(),
        ErrorOutcome::Responded { status, .. } if status.is_success()
    ));
}

#[tokio::test]
async fn test_normal_workflow_creates_tasks() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    let mut report = SimulationReport::default();
    simulator.normal_workflow(&mut report).await;

    assert_eq!(report.workflows, 1);
    assert_eq!(report.failed_requests, 0);
    assert!((1..=3).contains(&report.tasks_created));
    assert!(report.requests >= 3);
}

#[tokio::test]
async fn test_error_workflow() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    let mut report = SimulationReport::default();
    simulator.error_workflow(&mut report).await;

    assert_eq!(report.failed_requests, 0);
    assert!((1..=2).contains(&report.errors_simulated));
}

#[tokio::test]
async fn test_burst() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    let report = simulator.burst(6, 2).await.unwrap();

    assert_eq!(report.requests, 12);
    assert_eq!(report.failed_requests, 0);
    // Indices 0 and 3 of each burst inject faults.
    assert_eq!(report.errors_simulated, 4);
    assert_eq!(report.tasks_created, 8);

    let tasks = simulator.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 8);
}

#[tokio::test]
async fn test_continuous_stops_at_deadline() {
    let app = common::spawn_app().await;
    let simulator = TrafficSimulator::new(app.base_url(), Pacing::immediate());

    let report = simulator
        .continuous(Duration::from_millis(200))
        .await
        .unwrap();

    assert!(report.workflows >= 1);
    assert!(report.elapsed >= Duration::from_millis(200));
    assert_eq!(report.failed_requests, 0);
}
