//! Error types for the portfolio analysis dispatcher
//!
//! Degraded data, rejected input and inconsistent narratives are normal
//! outcomes and never show up here. Only faults the pipeline cannot
//! continue past are represented as errors.

use thiserror::Error;

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data source error: {0}")]
    DataSourceError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid stage transition: {0}")]
    InvalidTransition(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Decimal conversion error: {0}")]
    DecimalError(#[from] rust_decimal::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
