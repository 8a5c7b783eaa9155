//! # MultiApp Common
//!
//! Shared error types, logging setup, and configuration loading for the
//! multiapp offline cache workspace.
//!
//! ## Features
//!
//! - Unified error type with a category for log fields
//! - Logging configuration and setup
//! - JSON configuration file with dashboard defaults

use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{AppConfig, LoggingSection, NetworkSection, StorageSection, WorkerSection};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the multiapp binaries.
#[derive(Error, Debug)]
pub enum MultiAppError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Cache storage errors.
    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker lifecycle errors.
    #[error("Worker error: {message}")]
    Worker {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse errors.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl MultiAppError {
    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cache error with source.
    pub fn cache_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a worker error with source.
    pub fn worker_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Worker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            MultiAppError::Network { .. } => "network",
            MultiAppError::Cache { .. } => "cache",
            MultiAppError::Worker { .. } => "worker",
            MultiAppError::Config { .. } => "config",
            MultiAppError::Io(_) => "io",
            MultiAppError::Json(_) => "json",
            MultiAppError::Url(_) => "url",
            MultiAppError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for multiapp operations.
pub type Result<T> = std::result::Result<T, MultiAppError>;
