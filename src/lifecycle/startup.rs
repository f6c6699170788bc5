//! Startup orchestration.
//!
//! # Responsibilities
//! - Open and instrument the task store, then create its schema
//! - Build the router and wrap it in server instrumentation
//! - Bind the listener last, so traffic only arrives once everything is ready
//!
//! # Design Decisions
//! - Fail fast: store and bind errors are fatal
//! - Instrumentation failures are not; the registry falls back to the
//!   uninstrumented value

use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::AppConfig;
use crate::http::{AppState, HttpServer, TodoMetrics};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_listener;
use crate::storage::{self, SharedStore, StoreError};
use crate::telemetry::{AppMeter, InstrumentationRegistry, ProfilerHandle, SpanFactory, Telemetry};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Telemetry handles the application records through.
#[derive(Clone)]
pub struct Instruments {
    pub spans: SpanFactory,
    pub meter: AppMeter,
    pub profiler: ProfilerHandle,
}

impl Instruments {
    pub fn from_telemetry(telemetry: &Telemetry) -> Self {
        Self {
            spans: telemetry.traces.spans(),
            meter: telemetry.meter_or_detached(),
            profiler: telemetry.profiler.clone(),
        }
    }
}

/// Instrument `store`, migrate it, and build the instrumented router.
pub async fn build_application(
    config: &AppConfig,
    store: SharedStore,
    instruments: Instruments,
) -> Result<Router, StoreError> {
    let mut registry =
        InstrumentationRegistry::new(instruments.spans.clone(), instruments.meter.clone());

    let store = registry.instrument_db_driver(store);
    store.migrate().await?;
    tracing::info!(system = store.system(), "Task store ready");

    let state = AppState {
        store,
        metrics: TodoMetrics::new(&instruments.meter),
        spans: instruments.spans,
        profiler: instruments.profiler,
        simulation: config.simulation.clone(),
        service_name: Arc::from(config.telemetry.service_name.as_str()),
    };

    let router = HttpServer::build_router(&config.server, state);
    let router = registry.instrument_framework(router);

    tracing::info!(
        libraries = ?registry.instrumented_libraries(),
        "Automatic instrumentation applied"
    );
    Ok(router)
}

/// Run the service until a termination signal arrives.
pub async fn run(config: AppConfig, telemetry: &Telemetry) -> Result<(), StartupError> {
    let instruments = Instruments::from_telemetry(telemetry);
    let store = storage::connect(&config.database, instruments.spans.clone()).await?;
    let router = build_application(&config, store, instruments).await?;

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.server.bind_address.clone(),
            source,
        })?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_listener(shutdown);

    HttpServer::new(router)
        .run(listener, server_shutdown)
        .await
        .map_err(StartupError::Server)
}
