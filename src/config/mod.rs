//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: SETUP, ENVIRONMENT, DB_*)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → threaded explicitly into telemetry, storage and http
//! ```
//!
//! # Design Decisions
//! - The environment is read exactly once, at process entry
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AppConfig;
pub use schema::DatabaseConfig;
pub use schema::DeploymentMode;
pub use schema::LogFormat;
pub use schema::LoggingConfig;
pub use schema::ServerConfig;
pub use schema::SimulationConfig;
pub use schema::StoreBackend;
pub use schema::TelemetryConfig;
