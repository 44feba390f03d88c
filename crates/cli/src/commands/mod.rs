//! Command handlers for the Promptly CLI.
//!
//! This module organizes all CLI commands into separate submodules and
//! holds the store context they share.

pub mod persona;
pub mod profile;
pub mod prompt;
pub mod roles;
pub mod template;

// Re-export command types for convenience
pub use persona::PersonaCommand;
pub use profile::ProfileCommand;
pub use prompt::PromptCommand;
pub use roles::RolesCommand;
pub use template::TemplateCommand;

use promptly_core::{AppConfig, AppResult};
use promptly_store::{open_storage, PromptService, Storage, StorageConfig, TenantKey, TenantPool};
use serde::Serialize;
use std::sync::Arc;

/// Open store plus the service running on it.
pub struct Context {
    pub service: PromptService,
    pool: Option<TenantPool>,
}

impl Context {
    /// Open the configured store, or the tenant's own store when `tenant` is set.
    pub fn open(config: &AppConfig, tenant: Option<TenantKey>) -> AppResult<Self> {
        config.ensure_data_dir()?;

        match tenant {
            Some(key) => {
                let pool = TenantPool::new(config.tenant_dir(), config.read_pool_size);
                let store: Arc<dyn Storage> = pool.get_store(&key)?;
                tracing::debug!("Using tenant store for {}", key);
                Ok(Self {
                    service: PromptService::new(store),
                    pool: Some(pool),
                })
            }
            None => {
                let store = open_storage(&StorageConfig::from_app_config(config))?;
                Ok(Self {
                    service: PromptService::new(store),
                    pool: None,
                })
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        self.service.store()
    }

    pub fn close(self) -> AppResult<()> {
        match self.pool {
            Some(pool) => pool.shutdown(),
            None => self.service.store().close(),
        }
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
