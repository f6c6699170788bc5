//! To-do service (v1)
//!
//! A small task API instrumented end to end with OpenTelemetry.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                   TO-DO SERVICE                      │
//!                 │                                                      │
//!   Request       │  ┌────────────┐   ┌───────────┐   ┌──────────────┐   │
//!   ──────────────┼─▶│ server span│──▶│  request  │──▶│   handlers   │   │
//!                 │  │ (axum)     │   │  metrics  │   │ span + tags  │   │
//!                 │  └────────────┘   └───────────┘   └──────┬───────┘   │
//!                 │                                          ▼           │
//!                 │                                  ┌──────────────┐    │
//!                 │                                  │ instrumented │    │   PostgreSQL
//!                 │                                  │    store     │────┼──▶ or memory
//!                 │                                  └──────────────┘    │
//!                 │                                                      │
//!                 │  ┌────────────────────────────────────────────────┐  │
//!                 │  │ telemetry: traces │ metrics │ logs │ profiles  │──┼──▶ collector
//!                 │  └────────────────────────────────────────────────┘  │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Process Layout
//!
//! Telemetry providers use a blocking HTTP exporter, so they are built and
//! shut down on the main thread. The async runtime lives in between.

use std::path::PathBuf;

use clap::Parser;
use todo_otel::config::loader;
use todo_otel::lifecycle::startup;
use todo_otel::telemetry::logging::init_subscriber;
use todo_otel::Telemetry;

#[derive(Parser)]
#[command(name = "todo-otel")]
#[command(about = "To-do service with OpenTelemetry instrumentation", long_about = None)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = loader::load(cli.config.as_deref())?;

    let mut telemetry = Telemetry::init(&config.telemetry);

    let (handler, bridge_error) = match telemetry.logs.setup_logging() {
        Ok(handler) => (Some(handler), None),
        Err(e) => (None, Some(e)),
    };
    init_subscriber(&config.logging, handler)?;
    if let Some(e) = bridge_error {
        tracing::warn!(error = %e, "Log export unavailable, logging to console only");
    }

    tracing::info!(
        service = %config.telemetry.service_name,
        environment = %config.telemetry.environment,
        deployment_mode = ?config.telemetry.deployment_mode,
        bind_address = %config.server.bind_address,
        "todo-otel v0.1.0 starting"
    );
    telemetry.report();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(startup::run(config, &telemetry));
    drop(runtime);

    if let Err(e) = &result {
        tracing::error!(error = %e, "Service stopped with an error");
    }

    telemetry.shutdown();
    tracing::info!("Shutdown complete");
    result.map_err(Into::into)
}
