// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable store backends for the persistent tier.
//!
//! - [`memory::InMemoryDurableStore`]: process-local, for tests
//! - [`sql::SqlDurableStore`]: SQLite / MySQL via sqlx
//! - [`redis::RedisDurableStore`]: Redis JSON documents

pub mod traits;
pub mod memory;
pub mod sql;
pub mod redis;

use std::sync::Arc;

use traits::{DurableStore, StorageError};

/// Open a durable store from a connection string.
///
/// `redis://` / `rediss://` URLs open a [`redis::RedisDurableStore`];
/// anything else is handed to sqlx.
pub async fn connect(url: &str, name: &str) -> Result<Arc<dyn DurableStore>, StorageError> {
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        Ok(Arc::new(redis::RedisDurableStore::new(url, name).await?))
    } else {
        Ok(Arc::new(sql::SqlDurableStore::new(url, name).await?))
    }
}
