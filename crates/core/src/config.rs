//! Configuration management for Promptly.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Defaults
//! - Config file (`<data_dir>/config.yaml` or an explicit path)
//! - Environment variables
//! - Command-line flags
//!
//! Later sources win. All persisted state lives under `data_dir`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

const DEFAULT_READ_POOL_SIZE: usize = 4;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per entity collection
    Json,
    /// SQLite database with foreign keys
    #[default]
    Sqlite,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Json => "json",
            StorageBackend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(StorageBackend::Json),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(AppError::Config(format!(
                "Invalid storage type '{}', must be 'json' or 'sqlite'",
                other
            ))),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for all persisted data
    pub data_dir: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Selected storage backend
    pub storage: StorageBackend,

    /// Directory holding the JSON documents (json backend)
    pub json_dir: Option<PathBuf>,

    /// Database file (sqlite backend, untenanted access)
    pub db_path: Option<PathBuf>,

    /// Directory holding one database per tenant
    pub tenant_dir: Option<PathBuf>,

    /// Read connections opened per SQLite store
    pub read_pool_size: usize,

    /// Log level override
    pub log_level: Option<String>,

    /// Log line format
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    storage: Option<StorageSection>,
    logging: Option<LoggingSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageSection {
    #[serde(rename = "type")]
    kind: Option<StorageBackend>,
    json_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    tenant_dir: Option<PathBuf>,
    read_pool_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    format: Option<LogFormat>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            config_file: None,
            storage: StorageBackend::default(),
            json_dir: None,
            db_path: None,
            tenant_dir: None,
            read_pool_size: DEFAULT_READ_POOL_SIZE,
            log_level: None,
            log_format: LogFormat::default(),
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the YAML config file and environment variables.
    ///
    /// Environment variables:
    /// - `PROMPTLY_DATA_DIR`: Override data directory
    /// - `PROMPTLY_CONFIG`: Path to config file
    /// - `PROMPTLY_STORAGE`: Storage backend (`json` or `sqlite`)
    /// - `PROMPTLY_JSON_DIR`, `PROMPTLY_DB_PATH`, `PROMPTLY_TENANT_DIR`: Storage locations
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use promptly_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Data dir: {:?}", config.data_dir);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with command-line values for the data directory and config file.
    ///
    /// `data_dir` wins over `PROMPTLY_DATA_DIR` and `config_file` over `PROMPTLY_CONFIG`. Without
    /// an explicit file, `<data_dir>/config.yaml` is read from the resolved data directory.
    pub fn load_with(data_dir: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(data_dir) = data_dir {
            config.data_dir = data_dir;
        } else if let Ok(data_dir) = std::env::var("PROMPTLY_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        config.config_file = config_file.or_else(|| {
            std::env::var("PROMPTLY_CONFIG").ok().map(PathBuf::from)
        });

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.data_dir.join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file does not exist: {:?}",
                config_path
            )));
        }

        // Environment variables override YAML config
        if let Ok(storage) = std::env::var("PROMPTLY_STORAGE") {
            config.storage = storage.parse()?;
        }

        if let Ok(dir) = std::env::var("PROMPTLY_JSON_DIR") {
            config.json_dir = Some(PathBuf::from(dir));
        }

        if let Ok(path) = std::env::var("PROMPTLY_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("PROMPTLY_TENANT_DIR") {
            config.tenant_dir = Some(PathBuf::from(dir));
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge(config_file))
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(storage) = file.storage {
            if let Some(kind) = storage.kind {
                self.storage = kind;
            }
            if storage.json_dir.is_some() {
                self.json_dir = storage.json_dir;
            }
            if storage.db_path.is_some() {
                self.db_path = storage.db_path;
            }
            if storage.tenant_dir.is_some() {
                self.tenant_dir = storage.tenant_dir;
            }
            if let Some(size) = storage.read_pool_size {
                self.read_pool_size = size;
            }
        }

        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(format) = logging.format {
                self.log_format = format;
            }
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        storage: Option<StorageBackend>,
        log_level: Option<String>,
        log_format: Option<LogFormat>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }

        if let Some(storage) = storage {
            self.storage = storage;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if let Some(log_format) = log_format {
            self.log_format = log_format;
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Directory holding the JSON documents.
    pub fn json_dir(&self) -> PathBuf {
        self.json_dir.clone().unwrap_or_else(|| self.data_dir.clone())
    }

    /// Database file for untenanted access.
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("promptly.db"))
    }

    /// Directory holding per-tenant databases.
    pub fn tenant_dir(&self) -> PathBuf {
        self.tenant_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tenants"))
    }

    /// Ensure the data directory exists.
    pub fn ensure_data_dir(&self) -> AppResult<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                AppError::Config(format!(
                    "Failed to create data directory {:?}: {}",
                    self.data_dir, e
                ))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        if self.read_pool_size == 0 {
            return Err(AppError::Config(
                "readPoolSize must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
