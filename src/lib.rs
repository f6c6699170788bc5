//! To-do service with OpenTelemetry traces, metrics and logs, and
//! continuous profiling.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod simulator;
pub mod storage;
pub mod telemetry;

pub use config::schema::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::Telemetry;
