//! Storage for Promptly.
//!
//! One contract, two interchangeable backends:
//! - [`FileStorage`]: one JSON document per entity collection
//! - [`SqliteStorage`]: SQLite tables with foreign keys and cascading deletes
//!
//! [`TenantPool`] provisions one isolated SQLite store per tenant, and
//! [`PromptService`] runs the template and rendering workflows on top of
//! any [`Storage`].

pub mod factory;
pub mod jsonstore;
pub mod pool;
pub mod service;
pub mod sqlite;
pub mod store;
pub mod tracking;

#[cfg(test)]
mod tests;

pub use factory::{open_storage, StorageConfig};
pub use jsonstore::FileStorage;
pub use pool::{TenantKey, TenantPool};
pub use service::PromptService;
pub use sqlite::SqliteStorage;
pub use store::Storage;
pub use tracking::{Activity, ActivityEvent, ActivityTracker, NoopTracker, TracingTracker};
