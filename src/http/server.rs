//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request metrics, panics, timeout, request ID)
//! - Serve on a listener until shutdown is signalled

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::config::{ServerConfig, SimulationConfig};
use crate::http::handlers;
use crate::http::metrics::TodoMetrics;
use crate::http::middleware::observe_request;
use crate::http::response::panic_response;
use crate::storage::SharedStore;
use crate::telemetry::{ProfilerHandle, SpanFactory};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub metrics: TodoMetrics,
    pub spans: SpanFactory,
    pub profiler: ProfilerHandle,
    pub simulation: SimulationConfig,
    pub service_name: Arc<str>,
}

/// HTTP server for the to-do service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers run outermost first: request ID, request metrics, timeout,
    /// panic recovery, handler.
    #[allow(deprecated)]
    pub fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let metrics = state.metrics.clone();
        Router::new()
            .route("/", get(handlers::index))
            .route("/api/tasks", get(handlers::list_tasks).post(handlers::create_task))
            .route("/api/tasks/{id}/complete", post(handlers::complete_task))
            .route("/api/tasks/{id}", delete(handlers::delete_task))
            .route("/api/simulate-error/{error_type}", post(handlers::simulate_error))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(middleware::from_fn_with_state(metrics, observe_request))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
