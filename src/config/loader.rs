//! Configuration loading from disk and the process environment.

use std::path::Path;
use std::fs;
use crate::config::schema::{AppConfig, DeploymentMode};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value `{}` for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolve the process configuration once at startup.
///
/// Reads the optional TOML file, applies environment overrides, then validates
/// the merged result.
pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_with_env(path, |var| std::env::var(var).ok())
}

/// [`load`] with environment variables read through `lookup`.
pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// `SETUP` always decides the deployment mode when present.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(setup) = lookup("SETUP") {
        config.telemetry.deployment_mode = DeploymentMode::from_flag(Some(&setup));
    }
    if let Some(environment) = lookup("ENVIRONMENT") {
        config.telemetry.environment = environment;
    }
    if let Some(bind) = lookup("BIND_ADDRESS") {
        config.server.bind_address = bind;
    }

    let db = &mut config.database;
    if let Some(host) = lookup("DB_HOST") {
        db.host = host;
    }
    if let Some(name) = lookup("DB_NAME") {
        db.name = name;
    }
    if let Some(user) = lookup("DB_USER") {
        db.user = user;
    }
    if let Some(password) = lookup("DB_PASSWORD") {
        db.password = password;
    }
    if let Some(port) = lookup("DB_PORT") {
        db.port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var: "DB_PORT", value: port.clone() })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_setup_docker_selects_container_mode() {
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, env(&[("SETUP", "docker")])).unwrap();
        assert_eq!(config.telemetry.deployment_mode, DeploymentMode::Container);
    }

    #[test]
    fn test_unknown_setup_falls_back_to_local() {
        let mut config = AppConfig::default();
        config.telemetry.deployment_mode = DeploymentMode::Container;
        apply_env_overrides(&mut config, env(&[("SETUP", "bare-metal")])).unwrap();
        assert_eq!(config.telemetry.deployment_mode, DeploymentMode::Local);
    }

    #[test]
    fn test_database_overrides() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("DB_HOST", "db"), ("DB_PORT", "6543"), ("ENVIRONMENT", "staging")]),
        )
        .unwrap();
        assert_eq!(config.database.host, "db");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.telemetry.environment, "staging");
    }

    #[test]
    fn test_bad_port_is_reported() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("DB_PORT", "five")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "DB_PORT", .. }));
    }

    #[test]
    fn test_load_merges_file_and_environment() {
        let path = std::env::temp_dir().join(format!("todo-otel-{}.toml", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:5001\"\n\n[database]\nbackend = \"memory\"").unwrap();

        let config = load_with_env(Some(&path), env(&[("DB_HOST", "db")])).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:5001");
        assert_eq!(config.database.backend, crate::config::StoreBackend::Memory);
        assert_eq!(config.database.host, "db");

        let overridden =
            load_with_env(Some(&path), env(&[("BIND_ADDRESS", "127.0.0.1:6001")])).unwrap();
        assert_eq!(overridden.server.bind_address, "127.0.0.1:6001");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = load_with_env(None, env(&[])).unwrap();
        assert_eq!(config.server.bind_address, AppConfig::default().server.bind_address);
    }

    #[test]
    fn test_load_validates_overridden_values() {
        let err = load_with_env(None, env(&[("BIND_ADDRESS", "not-an-address")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("todo-otel-does-not-exist.toml");
        let err = load_with_env(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
