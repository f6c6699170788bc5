//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use tokio::net::TcpListener;
use todo_otel::config::AppConfig;
use todo_otel::http::HttpServer;
use todo_otel::lifecycle::startup::{build_application, Instruments};
use todo_otel::lifecycle::Shutdown;
use todo_otel::storage::memory::InMemoryTaskStore;
use todo_otel::storage::SharedStore;
use todo_otel::telemetry::{AppMeter, ProfilerHandle, SignalStatus, SpanFactory};

/// A server running on an ephemeral port over an in-memory store.
#[allow(dead_code)]
pub struct TestApp {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryTaskStore>,
    pub shutdown: Shutdown,
}

#[allow(dead_code)]
impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Configuration with fault injection shortened for tests.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.server.bind_address = "127.0.0.1:0".to_string();
    config.simulation.timeout_secs = 0;
    config.simulation.slow_min_ms = 1;
    config.simulation.slow_max_ms = 5;
    config
}

/// Instruments that record nowhere.
pub fn quiet_instruments() -> Instruments {
    Instruments {
        spans: SpanFactory::disabled(),
        meter: AppMeter::detached(),
        profiler: ProfilerHandle::unconfigured(SignalStatus::Disabled),
    }
}

/// Instruments whose spans land in the returned exporter.
#[allow(dead_code)]
pub fn recording_instruments() -> (Instruments, InMemorySpanExporter, SdkTracerProvider) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let instruments = Instruments {
        spans: SpanFactory::from_tracer(provider.tracer("todo-otel-test")),
        meter: AppMeter::detached(),
        profiler: ProfilerHandle::unconfigured(SignalStatus::Disabled),
    };
    (instruments, exporter, provider)
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config(), quiet_instruments()).await
}

pub async fn spawn_app_with(config: AppConfig, instruments: Instruments) -> TestApp {
    let store = Arc::new(InMemoryTaskStore::new());
    let shared: SharedStore = store.clone();
    let router = build_application(&config, shared, instruments)
        .await
        .expect("in-memory store migrates");

    let listener = TcpListener::bind(&config.server.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = HttpServer::new(router).run(listener, rx).await;
    });

    TestApp {
        addr,
        store,
        shutdown,
    }
}
