// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::CacheRecord;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Entry not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupted entry for '{id}': {reason}")]
    Corruption {
        id: String,
        reason: String,
    },
    #[error("Durable store unavailable")]
    Unavailable,
}

/// What the durable store holds per id: the record plus the URL it came
/// from (kept for diagnostics only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub record: CacheRecord,
    pub url: String,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<PersistedEntry>, StorageError>;
    async fn put(&self, id: &str, entry: &PersistedEntry) -> Result<(), StorageError>;
    async fn delete(&self, id: &str) -> Result<(), StorageError>;

    /// Remove every entry but keep the store usable.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Destroy the named store wholesale (table / key namespace).
    async fn drop_all(&self, name: &str) -> Result<(), StorageError>;

    /// Short backend label for logs and metrics.
    fn backend(&self) -> &'static str;
}
