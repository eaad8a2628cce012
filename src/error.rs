//! Error types for feedshaper.

use thiserror::Error;

use crate::adapter::AdapterError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("platform error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
