//! Error types for the Islamic finance advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Domain Errors
    // =============================

    /// Malformed or out-of-range input. Always names the offending field.
    #[error("Validation error on '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Remote service error: {0}")]
    RemoteService(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdvisorError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AdvisorError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field reference for validation failures
    pub fn field(&self) -> Option<&str> {
        match self {
            AdvisorError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Remote and parse failures are recovered locally by the orchestrator
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AdvisorError::RemoteService(_) | AdvisorError::Parse(_) | AdvisorError::Http(_)
        )
    }

    /// Caller-facing message. Internal failures are masked unless details are exposed.
    pub fn public_message(&self, expose_details: bool) -> String {
        match self {
            AdvisorError::Validation { .. } | AdvisorError::NotFound(_) => self.to_string(),
            _ if expose_details => self.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}
