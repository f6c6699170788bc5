//! Global `tracing` subscriber.
//!
//! Console output goes through a fmt layer filtered by `RUST_LOG` (or the
//! configured level); the log bridge, when present, sits beside it with its
//! own filter so it still sees every event.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::telemetry::error::TelemetryError;
use crate::telemetry::logs::LogHandler;

/// Install the process-wide subscriber. Can only succeed once per process.
pub fn init_subscriber(
    config: &LoggingConfig,
    handler: Option<LogHandler>,
) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.level)));

    let console: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(handler.map(LogHandler::into_layer))
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
