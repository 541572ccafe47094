// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::traits::{DurableStore, PersistedEntry, StorageError};

/// Process-local [`DurableStore`].
///
/// Does not survive restarts; used as a test double and for embedders that
/// want the two-tier semantics without a database.
pub struct InMemoryDurableStore {
    name: String,
    data: DashMap<String, PersistedEntry>,
}

impl InMemoryDurableStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: DashMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.data.contains_key(id)
    }
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new("fetch_cache")
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, id: &str) -> Result<Option<PersistedEntry>, StorageError> {
        Ok(self.data.get(id).map(|r| r.value().clone()))
    }

    async fn put(&self, id: &str, entry: &PersistedEntry) -> Result<(), StorageError> {
        self.data.insert(id.to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.data.remove(id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.clear();
        Ok(())
    }

    async fn drop_all(&self, name: &str) -> Result<(), StorageError> {
        if name == self.name {
            self.data.clear();
        } else {
            debug!(store = %self.name, requested = %name, "Drop for another store ignored");
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CacheRecord;
    use serde_json::json;
    use std::time::Duration;

    fn entry(v: i64) -> PersistedEntry {
        PersistedEntry {
            record: CacheRecord::new(json!({"v": v}), 0, Duration::from_secs(60)),
            url: "/test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = InMemoryDurableStore::new("s");
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryDurableStore::default();
        store.put("a", &entry(1)).await.unwrap();

        let got = store.get("a").await.unwrap().unwrap();
        assert_eq!(got.record.payload, json!({"v": 1}));
        assert_eq!(got.url, "/test");
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = InMemoryDurableStore::default();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = InMemoryDurableStore::default();
        store.put("same", &entry(1)).await.unwrap();
        store.put("same", &entry(2)).await.unwrap();

        assert_eq!(store.len(), 1);
        let got = store.get("same").await.unwrap().unwrap();
        assert_eq!(got.record.payload["v"], 2);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = InMemoryDurableStore::default();
        assert!(store.delete("nope").await.is_ok());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemoryDurableStore::default();
        for i in 0..10 {
            store.put(&format!("e-{}", i), &entry(i)).await.unwrap();
        }
        assert_eq!(store.len(), 10);

        store.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_drop_all_only_matches_own_name() {
        let store = InMemoryDurableStore::new("mine");
        store.put("a", &entry(1)).await.unwrap();

        store.drop_all("other").await.unwrap();
        assert_eq!(store.len(), 1);

        store.drop_all("mine").await.unwrap();
        assert!(store.is_empty());
    }
}
