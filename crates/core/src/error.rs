//! Error types for Promptly.
//!
//! This module defines a unified error enum covering every failure the
//! template engine and its storage backends can report: missing entities,
//! version conflicts, invalid references, I/O and engine failures, and
//! tenant store provisioning failures.

use thiserror::Error;

/// Unified error type for Promptly.
///
/// All store and service functions return `Result<T, AppError>`.
/// Nothing retries internally; the caller decides what to do with a failure.
#[derive(Error, Debug)]
pub enum AppError {
    /// Entity id (or id + version) is absent
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate version, duplicate id, or an update aimed at a missing version
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced persona, template or profile does not exist
    #[error("Validation error: {0}")]
    Validation(String),

    /// Relational engine or lock failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tenant store could not be provisioned
    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Response class a transport layer should use for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Conflict,
    Internal,
}

impl AppError {
    /// Build a `NotFound` error for the given entity kind.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classify this error for the caller-facing layer.
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::NotFound { .. } => ErrorClass::NotFound,
            AppError::Validation(_) | AppError::Config(_) => ErrorClass::BadRequest,
            AppError::Conflict(_) => ErrorClass::Conflict,
            AppError::Storage(_)
            | AppError::Io(_)
            | AppError::SchemaInit(_)
            | AppError::Serialization(_)
            | AppError::Other(_) => ErrorClass::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
