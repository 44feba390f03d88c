//! Promptly Core Library
//!
//! This crate provides the foundational utilities shared by the prompt
//! engine, the storage backends and the CLI:
//! - Error handling (`AppError`, `AppResult`, `ErrorClass`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, StorageBackend};
pub use error::{AppError, AppResult, ErrorClass};
pub use logging::LogFormat;
