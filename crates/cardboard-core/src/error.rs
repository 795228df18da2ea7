//! Error types for cardboard-core

use thiserror::Error;

use crate::config::ConfigError;
use crate::http::{FetchError, TransportError};
use crate::session::AuthError;

/// Result type alias using cardboard-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in cardboard-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote fetch failed after the fetcher gave up
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Transport(#[from] TransportError),

    /// Session/login failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Settings could not be resolved
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cache backend (Redis, fingerprint table) failure
    #[error("Cache error: {0}")]
    Cache(String),
}
