// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis durable store for the persistent tier.
//!
//! Each entry is a JSON string under `<store>:<id>`:
//! ```json
//! {
//!   "record": {"payload": {"name": "Alice"}, "fetched_at": 1767084657058, "expires_at": 1767084957058},
//!   "url": "https://api.example.com/users/alice"
//! }
//! ```
//!
//! Keys carry no Redis TTL: expired records must still be readable so the
//! stale-tolerant strategies can serve them.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::traits::{DurableStore, PersistedEntry, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

/// Keys deleted per `DEL` while clearing a namespace
const SCAN_BATCH: usize = 500;

pub struct RedisDurableStore {
    connection: ConnectionManager,
    name: String,
}

impl RedisDurableStore {
    /// Connect with retry and namespace keys under `name`.
    pub async fn new(connection_string: &str, name: &str) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::connect(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            name: name.to_string(),
        })
    }

    #[inline]
    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.name, id)
    }

    /// Get a clone of the connection manager.
    pub fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Delete every key matching `pattern`, in batches.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, StorageError> {
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

            if !keys.is_empty() {
                deleted += keys.len();
                let _: () = conn
                    .del(keys)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }
}

#[async_trait]
impl DurableStore for RedisDurableStore {
    async fn get(&self, id: &str) -> Result<Option<PersistedEntry>, StorageError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn
            .get(self.key(id))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        raw.map(|doc| {
            serde_json::from_str(&doc).map_err(|e| StorageError::Corruption {
                id: id.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn put(&self, id: &str, entry: &PersistedEntry) -> Result<(), StorageError> {
        let doc = serde_json::to_string(entry)
            .map_err(|e| StorageError::Backend(format!("Failed to encode entry: {}", e)))?;
        let key = self.key(id);

        retry("redis_put", &RetryConfig::write(), || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            let doc = doc.clone();
            async move {
                let _: () = conn.set(key, doc).await?;
                Ok::<(), redis::RedisError>(())
            }
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .del(self.key(id))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let deleted = self.delete_matching(&format!("{}:*", self.name)).await?;
        debug!(store = %self.name, deleted, "Cleared Redis durable store");
        Ok(())
    }

    async fn drop_all(&self, name: &str) -> Result<(), StorageError> {
        let deleted = self.delete_matching(&format!("{}:*", name)).await?;
        debug!(store = %name, deleted, "Dropped Redis key namespace");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
