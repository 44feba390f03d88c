//! Storage backend factory.
//!
//! This module picks and opens a storage backend from configuration. It
//! handles path resolution for the chosen backend and opens the store.

use crate::jsonstore::FileStorage;
use crate::sqlite::SqliteStorage;
use crate::store::Storage;
use promptly_core::{AppConfig, AppError, AppResult, StorageBackend};
use std::path::PathBuf;
use std::sync::Arc;

/// Settings needed to open a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// Directory for the JSON documents (json backend)
    pub json_dir: Option<PathBuf>,

    /// Database file (sqlite backend)
    pub db_path: Option<PathBuf>,

    pub read_pool_size: usize,
}

impl StorageConfig {
    /// Resolve storage settings from application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            backend: config.storage,
            json_dir: Some(config.json_dir()),
            db_path: Some(config.db_path()),
            read_pool_size: config.read_pool_size,
        }
    }
}

/// Open the store selected by `config`.
///
/// # Errors
/// Returns `Config` if the path for the selected backend is missing, or
/// whatever the backend reports while opening.
pub fn open_storage(config: &StorageConfig) -> AppResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Json => {
            let dir = config.json_dir.as_ref().ok_or_else(|| {
                AppError::Config("json storage requires a document directory".to_string())
            })?;
            Ok(Arc::new(FileStorage::open(dir)?))
        }
        StorageBackend::Sqlite => {
            let path = config.db_path.as_ref().ok_or_else(|| {
                AppError::Config("sqlite storage requires a database path".to_string())
            })?;
            Ok(Arc::new(SqliteStorage::open(path, config.read_pool_size)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(backend: StorageBackend, dir: &TempDir) -> StorageConfig {
        StorageConfig {
            backend,
            json_dir: Some(dir.path().join("json")),
            db_path: Some(dir.path().join("promptly.db")),
            read_pool_size: 1,
        }
    }

    #[test]
    fn test_open_json() {
        let dir = TempDir::new().unwrap();
        let store = open_storage(&config(StorageBackend::Json, &dir)).unwrap();
        assert_eq!(store.backend(), StorageBackend::Json);
        assert!(dir.path().join("json").join("persona.json").exists());
    }

    #[test]
    fn test_open_sqlite() {
        let dir = TempDir::new().unwrap();
        let store = open_storage(&config(StorageBackend::Sqlite, &dir)).unwrap();
        assert_eq!(store.backend(), StorageBackend::Sqlite);
        assert!(dir.path().join("promptly.db").exists());
    }

    #[test]
    fn test_missing_path_is_config_error() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(StorageBackend::Sqlite, &dir);
        cfg.db_path = None;
        assert!(matches!(open_storage(&cfg), Err(AppError::Config(_))));

        let mut cfg = config(StorageBackend::Json, &dir);
        cfg.json_dir = None;
        assert!(matches!(open_storage(&cfg), Err(AppError::Config(_))));
    }

    #[test]
    fn test_from_app_config() {
        let app = AppConfig {
            data_dir: PathBuf::from("/tmp/promptly"),
            storage: StorageBackend::Json,
            ..Default::default()
        };
        let cfg = StorageConfig::from_app_config(&app);
        assert_eq!(cfg.backend, StorageBackend::Json);
        assert_eq!(cfg.json_dir, Some(PathBuf::from("/tmp/promptly")));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/promptly/promptly.db")));
    }
}
