//! Error types for the churn prediction service

use crate::types::Industry;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for churn service operations
pub type Result<T> = std::result::Result<T, ChurnError>;

/// Main error type for the churn service
#[derive(Debug, Error)]
pub enum ChurnError {
    /// Missing or malformed input supplied by the caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown customer identity or no persisted feature table
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model or scaler file absent at startup
    #[error("Artifact not found for {industry}: {}", path.display())]
    ArtifactNotFound { industry: Industry, path: PathBuf },

    /// Artifact present but incompatible with the industry's feature order
    #[error("Artifact mismatch for {industry}: {reason}")]
    ArtifactMismatch { industry: Industry, reason: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Generator error: {0}")]
    Generator(String),

    /// Model fitting failed in the offline trainer
    #[error("Training error: {0}")]
    Training(String),

    /// A blocking prediction task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl ChurnError {
    /// Whether the error was caused by the request rather than the server
    pub fn is_client_error(&self) -> bool {
        matches!(self, ChurnError::Validation(_) | ChurnError::NotFound(_))
    }
}
