//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the to-do service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,

    /// Task storage settings.
    pub database: DatabaseConfig,

    /// Telemetry pipelines (traces, metrics, logs, profiling).
    pub telemetry: TelemetryConfig,

    /// Local logging facility.
    pub logging: LoggingConfig,

    /// Fault-injection endpoints.
    pub simulation: SimulationConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Which [`crate::storage::TaskStore`] implementation backs the service.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,

    /// Maximum pooled connections.
    pub max_connections: u32,

    /// Connection acquisition timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Connection URL for sqlx.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            name: "todoapp".to_string(),
            user: "todouser".to_string(),
            password: "todopass".to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
        }
    }
}

/// Where the telemetry collector lives.
///
/// `Container` addresses the collector by its service hostname; `Local` leaves
/// the exporters on their library defaults.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Local,
    Container,
}

impl DeploymentMode {
    /// Interpret the value of the deployment flag (the `SETUP` variable).
    ///
    /// Only `docker` and `container` select the containerized endpoints; any
    /// other value, including an absent one, means local.
    pub fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("docker") || v.eq_ignore_ascii_case("container") => {
                DeploymentMode::Container
            }
            _ => DeploymentMode::Local,
        }
    }
}

/// Telemetry configuration shared by every provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `service.name` resource attribute.
    pub service_name: String,

    /// `service.instance.id` resource attribute.
    pub instance_id: String,

    /// Deployment environment reported to the profiler.
    pub environment: String,

    pub deployment_mode: DeploymentMode,

    /// Collector hostname used in container mode.
    pub collector_host: String,

    pub traces: TracesConfig,
    pub metrics: MetricsConfig,
    pub logs: LogsConfig,
    pub profiling: ProfilingConfig,
}

impl TelemetryConfig {
    /// Defaults for the given service name.
    pub fn for_service(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            ..Self::default()
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "todo-app".to_string(),
            instance_id: "instance-1".to_string(),
            environment: "development".to_string(),
            deployment_mode: DeploymentMode::Local,
            collector_host: "alloy".to_string(),
            traces: TracesConfig::default(),
            metrics: MetricsConfig::default(),
            logs: LogsConfig::default(),
            profiling: ProfilingConfig::default(),
        }
    }
}

/// Trace pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracesConfig {
    pub enabled: bool,

    /// Explicit OTLP endpoint; overrides the deployment mode.
    pub endpoint: Option<String>,

    /// Fraction of traces sampled (0.0 to 1.0).
    pub sampling_ratio: f64,
}

impl Default for TracesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            sampling_ratio: 1.0,
        }
    }
}

/// Default metric export cadence.
pub const DEFAULT_EXPORT_INTERVAL_SECS: u64 = 10;

/// Metric pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,

    /// Seconds between periodic exports.
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            export_interval_secs: DEFAULT_EXPORT_INTERVAL_SECS,
        }
    }
}

/// Default bound on log records waiting for export.
pub const DEFAULT_LOG_MAX_QUEUE_SIZE: usize = 5;

/// Default number of log records per export call.
pub const DEFAULT_LOG_MAX_EXPORT_BATCH_SIZE: usize = 1;

/// Log pipeline configuration.
///
/// The small queue keeps delivery close to synchronous.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogsConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub max_queue_size: usize,
    pub max_export_batch_size: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            max_queue_size: DEFAULT_LOG_MAX_QUEUE_SIZE,
            max_export_batch_size: DEFAULT_LOG_MAX_EXPORT_BATCH_SIZE,
        }
    }
}

/// Continuous profiling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub enabled: bool,

    /// Application name under which profiles are stored.
    pub application_name: String,

    /// Explicit profiler server address; overrides the deployment mode.
    pub server_address: Option<String>,

    /// Samples per second.
    pub sample_rate: u32,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            application_name: "todo-app".to_string(),
            server_address: None,
            sample_rate: 100,
        }
    }
}

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Local logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Fault-injection configuration for `/api/simulate-error`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long the `timeout` simulation blocks.
    pub timeout_secs: u64,

    /// Lower bound of the `slow` simulation delay.
    pub slow_min_ms: u64,

    /// Upper bound of the `slow` simulation delay.
    pub slow_max_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            slow_min_ms: 2000,
            slow_max_ms: 5000,
        }
    }
}
