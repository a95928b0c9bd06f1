//! services/api/src/error.rs
//!
//! Startup failures of the tax analysis server. Request-time failures never
//! reach this type; handlers turn them into responses in `web::rest`.

use crate::config::ConfigError;
use axum::http::header::InvalidHeaderValue;

/// Everything that can stop `tax_api` from starting or keep it from serving.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Connecting the pool failed.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// `CORS_ORIGIN` is not usable as an `Access-Control-Allow-Origin` value.
    #[error("Invalid CORS origin: {0}")]
    CorsOrigin(#[from] InvalidHeaderValue),

    /// Binding the listener, creating the storage root, or serving.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
