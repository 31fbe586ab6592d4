//! Error types for the retrieval engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
