//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ratios, intervals, queue sizes)
//! - Check addresses parse before anything binds to them
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("server.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("server.request_timeout_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("telemetry.service_name must not be empty")]
    EmptyServiceName,

    #[error("telemetry.traces.sampling_ratio {0} is outside 0.0..=1.0")]
    SamplingRatioOutOfRange(f64),

    #[error("telemetry.metrics.export_interval_secs must be greater than zero")]
    ZeroExportInterval,

    #[error("telemetry.logs.max_queue_size must be greater than zero")]
    ZeroLogQueue,

    #[error("telemetry.logs.max_export_batch_size {batch} exceeds max_queue_size {queue}")]
    LogBatchExceedsQueue { batch: usize, queue: usize },

    #[error("telemetry.logs.max_export_batch_size must be greater than zero")]
    ZeroLogBatch,

    #[error("database.max_connections must be greater than zero")]
    ZeroDatabaseConnections,

    #[error("simulation.slow_min_ms {min} is greater than slow_max_ms {max}")]
    InvertedSlowRange { min: u64, max: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.server.bind_address.clone(),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    let telemetry = &config.telemetry;
    if telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }
    let ratio = telemetry.traces.sampling_ratio;
    if !(0.0..=1.0).contains(&ratio) {
        errors.push(ValidationError::SamplingRatioOutOfRange(ratio));
    }
    if telemetry.metrics.export_interval_secs == 0 {
        errors.push(ValidationError::ZeroExportInterval);
    }

    let logs = &telemetry.logs;
    if logs.max_queue_size == 0 {
        errors.push(ValidationError::ZeroLogQueue);
    }
    if logs.max_export_batch_size == 0 {
        errors.push(ValidationError::ZeroLogBatch);
    } else if logs.max_queue_size > 0 && logs.max_export_batch_size > logs.max_queue_size {
        errors.push(ValidationError::LogBatchExceedsQueue {
            batch: logs.max_export_batch_size,
            queue: logs.max_queue_size,
        });
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::ZeroDatabaseConnections);
    }

    let sim = &config.simulation;
    if sim.slow_min_ms > sim.slow_max_ms {
        errors.push(ValidationError::InvertedSlowRange {
            min: sim.slow_min_ms,
            max: sim.slow_max_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = AppConfig::default();
        config.server.bind_address = "nowhere".into();
        config.telemetry.service_name = "  ".into();
        config.telemetry.traces.sampling_ratio = 1.5;
        config.telemetry.metrics.export_interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptyServiceName));
        assert!(errors.contains(&ValidationError::ZeroExportInterval));
        assert!(errors.contains(&ValidationError::SamplingRatioOutOfRange(1.5)));
    }

    #[test]
    fn test_log_batch_must_fit_queue() {
        let mut config = AppConfig::default();
        config.telemetry.logs.max_queue_size = 2;
        config.telemetry.logs.max_export_batch_size = 8;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::LogBatchExceedsQueue { batch: 8, queue: 2 }]
        );
    }

    #[test]
    fn test_inverted_slow_range() {
        let mut config = AppConfig::default();
        config.simulation.slow_min_ms = 10;
        config.simulation.slow_max_ms = 5;
        assert!(validate_config(&config).is_err());
    }
}
