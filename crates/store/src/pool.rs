//! Per-tenant store provisioning.
//!
//! Every tenant gets its own SQLite file under one root directory. Stores
//! are opened lazily on first request and shared afterwards.

use promptly_core::{AppError, AppResult};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::sqlite::SqliteStorage;
use crate::store::Storage;

/// Identity of one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey(String);

impl TenantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for an authenticated user.
    pub fn from_identity(user_id: &str, email: &str) -> Self {
        Self(format!("{}-{}-promptly", user_id, email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name stem for this tenant's database.
    ///
    /// ASCII alphanumerics and `.`, `@`, `-` are kept; every other byte,
    /// `_` included, becomes `_xx` in lowercase hex. Distinct keys always
    /// produce distinct stems, and a stem never contains a path separator.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'@' | b'-') {
                stem.push(char::from(byte));
            } else {
                let _ = write!(stem, "_{:02x}", byte);
            }
        }
        // "." and ".." are not usable file names
        if stem.bytes().all(|b| b == b'.') {
            stem = stem.replace('.', "_2e");
        }
        stem
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tenant's store once opened. Its own lock serializes first open for that tenant only;
/// the map lock is never held while waiting on a slot. A failed open leaves the slot empty.
type Slot = Arc<Mutex<Option<Arc<SqliteStorage>>>>;

/// Lazily opened relational stores, one per tenant.
#[derive(Debug)]
pub struct TenantPool {
    root: PathBuf,
    read_pool_size: usize,
    slots: RwLock<HashMap<TenantKey, Slot>>,
}

impl TenantPool {
    pub fn new(root: impl Into<PathBuf>, read_pool_size: usize) -> Self {
        Self {
            root: root.into(),
            read_pool_size,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the database for `key` lives.
    pub fn path_for(&self, key: &TenantKey) -> PathBuf {
        self.root.join(format!("{}.db", key.file_stem()))
    }

    /// Store for `key`, opening and initializing it on first use.
    ///
    /// Concurrent first requests for the same key open exactly one store;
    /// every caller receives the same instance. A failed open is not cached.
    /// Opening happens outside the pool-wide map lock, so other tenants are
    /// never blocked behind it.
    pub fn get_store(&self, key: &TenantKey) -> AppResult<Arc<SqliteStorage>> {
        let slot = self.slot(key)?;
        let mut opened = slot.lock().map_err(|_| poisoned())?;
        if let Some(store) = opened.as_ref() {
            return Ok(Arc::clone(store));
        }

        let path = self.path_for(key);
        match SqliteStorage::open(&path, self.read_pool_size) {
            Ok(store) => {
                tracing::info!("Provisioned store for tenant {} at {:?}", key, path);
                let store = Arc::new(store);
                *opened = Some(Arc::clone(&store));
                Ok(store)
            }
            Err(e) => {
                tracing::warn!("Failed to provision store for tenant {}: {}", key, e);
                Err(match e {
                    AppError::SchemaInit(_) => e,
                    other => AppError::SchemaInit(format!("tenant {}: {}", key, other)),
                })
            }
        }
    }

    /// The slot for `key`, created empty on first request.
    fn slot(&self, key: &TenantKey) -> AppResult<Slot> {
        {
            let slots = self.slots.read().map_err(|_| poisoned())?;
            if let Some(slot) = slots.get(key) {
                return Ok(Arc::clone(slot));
            }
        }

        let mut slots = self.slots.write().map_err(|_| poisoned())?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    /// Number of open tenant stores.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = match self.slots.read() {
            Ok(slots) => slots.values().cloned().collect(),
            Err(_) => return 0,
        };
        slots
            .iter()
            .filter(|slot| slot.lock().map(|s| s.is_some()).unwrap_or(false))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and forget every open store. Close failures are logged, not returned.
    pub fn shutdown(&self) -> AppResult<()> {
        let drained: Vec<(TenantKey, Slot)> = {
            let mut slots = self.slots.write().map_err(|_| poisoned())?;
            slots.drain().collect()
        };

        for (key, slot) in drained {
            let store = slot.lock().map_err(|_| poisoned())?.take();
            if let Some(store) = store {
                if let Err(e) = store.close() {
                    tracing::error!("Failed to close store for tenant {}: {}", key, e);
                }
            }
        }

        tracing::debug!("Tenant pool shut down");
        Ok(())
    }
}

fn poisoned() -> AppError {
    AppError::Storage("tenant pool lock poisoned".to_string())
}
