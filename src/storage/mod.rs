//! Persistence layer for alerts, samples, and the notification window
//!
//! Mirrors the split between a backend trait and concrete backends:
//!
//! - `backend`: the `AlertStore` trait every backend implements
//! - `sqlite`: SQLite via sqlx (the production backend)
//! - `memory`: in-memory backend for tests and ephemeral runs
//! - `schema`: row and report types
//! - `error`: storage error types

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use backend::AlertStore;
pub use error::{StoreError, StoreResult};

use std::sync::Arc;

use tracing::warn;

use crate::config::StorageConfig;

/// Build the configured store backend.
pub async fn build_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn AlertStore>> {
    match config {
        StorageConfig::None => {
            warn!("running with in-memory storage, nothing will persist");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
        StorageConfig::Sqlite { path, .. } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
    }
}
