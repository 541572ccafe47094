// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memory tier: volatile id → record map.
//!
//! Reads return whatever is stored, expired or not. Staleness is the
//! caller's call. There is no size bound; entries leave only by explicit
//! delete or when a strategy evicts an expired record it found.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;

use crate::record::CacheRecord;

#[derive(Debug, Default)]
pub struct MemoryTier {
    entries: DashMap<String, CacheRecord>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<CacheRecord> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Store `payload` fetched at `fetched_at`, expiring after `ttl`.
    pub fn put(&self, id: &str, payload: Value, fetched_at: i64, ttl: Duration) {
        self.insert(id, CacheRecord::new(payload, fetched_at, ttl));
    }

    /// Store a record as-is (always overwrites).
    pub fn insert(&self, id: &str, record: CacheRecord) {
        self.entries.insert(id.to_string(), record);
        crate::metrics::set_memory_entries(self.entries.len());
    }

    pub fn delete(&self, id: &str) -> bool {
        let removed = self.entries.remove(id).is_some();
        if removed {
            crate::metrics::set_memory_entries(self.entries.len());
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        crate::metrics::set_memory_entries(0);
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
