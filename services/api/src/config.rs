//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tax_analysis_core::{AnalysisPolicy, ManagerConfig, ProgressPolicy};
use tracing::Level;

/// Longest session lifetime accepted from `SESSION_TTL_HOURS` (366 days).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub storage_root: PathBuf,
    pub storage_public_url: Option<String>,
    pub session_ttl_hours: i64,
    pub cleanup_interval_secs: u64,
    pub allow_step_regression: bool,
    pub analysis_policy: AnalysisPolicy,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections: u32 = parse_var("DB_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Storage Settings ---
        let storage_root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storage"));
        let storage_public_url = std::env::var("STORAGE_PUBLIC_URL").ok();

        // --- Load Workflow Settings ---
        let session_ttl_hours: i64 = parse_var("SESSION_TTL_HOURS", Some(24))?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&session_ttl_hours) {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_HOURS".to_string(),
                format!("must be between 1 and {}", MAX_SESSION_TTL_HOURS),
            ));
        }
        let cleanup_interval_secs: u64 = parse_var("CLEANUP_INTERVAL_SECS", Some(3600))?;
        let allow_step_regression: bool = parse_var("ALLOW_STEP_REGRESSION", Some(false))?;

        let analysis_policy = match std::env::var("ANALYSIS_DUPLICATES")
            .unwrap_or_else(|_| "replace".to_string())
            .to_lowercase()
            .as_str()
        {
            "replace" => AnalysisPolicy::ReplaceExisting,
            "allow" => AnalysisPolicy::AllowDuplicates,
            other => {
                return Err(ConfigError::InvalidValue(
                    "ANALYSIS_DUPLICATES".to_string(),
                    format!("'{}' is not one of 'replace' or 'allow'", other),
                ))
            }
        };

        // --- Load HTTP Settings ---
        let cors_origin = std::env::var("CORS_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());
        let max_upload_bytes: usize = parse_var("MAX_UPLOAD_BYTES", Some(10 * 1024 * 1024))?;

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            storage_root,
            storage_public_url,
            session_ttl_hours,
            cleanup_interval_secs,
            allow_step_regression,
            analysis_policy,
            cors_origin,
            max_upload_bytes,
        })
    }

    /// The subset of settings the session manager needs.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            session_ttl: chrono::Duration::hours(self.session_ttl_hours),
            progress: ProgressPolicy {
                allow_regression: self.allow_step_regression,
            },
            analysis: self.analysis_policy,
        }
    }
}

/// Reads and parses `name`, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BIND_ADDRESS",
        "DATABASE_URL",
        "DB_MAX_CONNECTIONS",
        "RUST_LOG",
        "STORAGE_ROOT",
        "STORAGE_PUBLIC_URL",
        "SESSION_TTL_HOURS",
        "CLEANUP_INTERVAL_SECS",
        "ALLOW_STEP_REGRESSION",
        "ANALYSIS_DUPLICATES",
        "CORS_ORIGIN",
        "MAX_UPLOAD_BYTES",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_when_only_database_url_is_set() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/tax");

        let config = Config::from_env().unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.storage_root, PathBuf::from("./storage"));
        assert_eq!(config.session_ttl_hours, 24);
        assert!(!config.allow_step_regression);
        assert_eq!(config.analysis_policy, AnalysisPolicy::ReplaceExisting);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        clear_env();
    }

    #[test]
    #[serial]
    fn missing_database_url_is_an_error() {
        clear_env();

        let err = Config::from_env().unwrap_err();

        assert!(matches!(err, ConfigError::MissingVar(ref v) if v == "DATABASE_URL"));
    }

    #[test]
    #[serial]
    fn workflow_settings_are_read() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/tax");
        std::env::set_var("ALLOW_STEP_REGRESSION", "true");
        std::env::set_var("ANALYSIS_DUPLICATES", "allow");
        std::env::set_var("SESSION_TTL_HOURS", "2");

        let config = Config::from_env().unwrap();
        let manager = config.manager_config();

        assert!(manager.progress.allow_regression);
        assert_eq!(manager.analysis, AnalysisPolicy::AllowDuplicates);
        assert_eq!(manager.session_ttl, chrono::Duration::hours(2));
        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_values_are_rejected() {
        clear_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/tax");
        std::env::set_var("ANALYSIS_DUPLICATES", "sometimes");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref v, _)) if v == "ANALYSIS_DUPLICATES"
        ));

        std::env::remove_var("ANALYSIS_DUPLICATES");
        std::env::set_var("SESSION_TTL_HOURS", "0");
        assert!(Config::from_env().is_err());

        std::env::set_var("SESSION_TTL_HOURS", "10000000000");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref v, _)) if v == "SESSION_TTL_HOURS"
        ));

        std::env::set_var("SESSION_TTL_HOURS", MAX_SESSION_TTL_HOURS.to_string());
        assert_eq!(
            Config::from_env().unwrap().session_ttl_hours,
            MAX_SESSION_TTL_HOURS
        );

        std::env::set_var("SESSION_TTL_HOURS", "many");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidValue(ref v, _)) if v == "SESSION_TTL_HOURS"
        ));
        clear_env();
    }
}
