// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL durable store (SQLite or MySQL) for the persistent tier.
//!
//! One table per store name:
//! ```sql
//! CREATE TABLE fetch_cache (
//!   id VARCHAR(255) PRIMARY KEY,
//!   url TEXT,                -- diagnostic only
//!   payload LONGTEXT,        -- JSON text (small payloads)
//!   payload_blob MEDIUMBLOB, -- zstd JSON (large payloads, `compression` feature)
//!   fetched_at BIGINT NOT NULL,
//!   expires_at BIGINT NOT NULL
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver treats MySQL LONGTEXT as bytes, so text columns are read
//! as `String` first and then as `Vec<u8>`.

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

use super::traits::{DurableStore, PersistedEntry, StorageError};
use crate::compression::{self, StoredPayload};
use crate::record::CacheRecord;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Turn a store name into a safe table identifier.
fn table_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "fetch_cache".to_string()
    } else {
        cleaned
    }
}

pub struct SqlDurableStore {
    pool: AnyPool,
    table: String,
    is_sqlite: bool,
}

impl SqlDurableStore {
    /// Connect with retry (fails fast if the URL is wrong) and create the
    /// table if needed.
    pub async fn new(connection_string: &str, name: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::connect(), || async {
            AnyPoolOptions::new()
                .max_connections(if is_sqlite { 1 } else { 10 })
                .acquire_timeout(Duration::from_secs(5))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        let store = Self {
            pool,
            table: table_name(name),
            is_sqlite,
        };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }
        store.init_schema().await?;
        info!(table = %store.table, sqlite = is_sqlite, "SQL durable store ready");
        Ok(store)
    }

    /// Get a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;
        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    url TEXT,
                    payload TEXT,
                    payload_blob BLOB,
                    fetched_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL
                )
                "#,
                self.table
            )
        } else {
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id VARCHAR(255) PRIMARY KEY,
                    url TEXT,
                    payload LONGTEXT,
                    payload_blob MEDIUMBLOB,
                    fetched_at BIGINT NOT NULL,
                    expires_at BIGINT NOT NULL
                )
                "#,
                self.table
            )
        };

        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to create table {}: {}", self.table, e)))?;
        Ok(())
    }

    fn upsert_sql(&self) -> String {
        if self.is_sqlite {
            format!(
                "INSERT INTO {} (id, url, payload, payload_blob, fetched_at, expires_at) VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET url = excluded.url, payload = excluded.payload, \
                 payload_blob = excluded.payload_blob, fetched_at = excluded.fetched_at, expires_at = excluded.expires_at",
                self.table
            )
        } else {
            format!(
                "INSERT INTO {} (id, url, payload, payload_blob, fetched_at, expires_at) VALUES (?, ?, ?, ?, ?, ?) \
                 ON DUPLICATE KEY UPDATE url = VALUES(url), payload = VALUES(payload), \
                 payload_blob = VALUES(payload_blob), fetched_at = VALUES(fetched_at), expires_at = VALUES(expires_at)",
                self.table
            )
        }
    }

    fn row_to_entry(id: &str, row: &AnyRow) -> Result<PersistedEntry, StorageError> {
        let fetched_at: i64 = row.try_get("fetched_at").map_err(|e| corrupt(id, e))?;
        let expires_at: i64 = row.try_get("expires_at").map_err(|e| corrupt(id, e))?;
        let url: String = read_text(row, "url").unwrap_or_default();

        let payload_blob: Option<Vec<u8>> = row.try_get("payload_blob").ok().flatten();
        let bytes = match payload_blob {
            Some(blob) if !blob.is_empty() => blob,
            _ => read_text(row, "payload")
                .map(String::into_bytes)
                .ok_or_else(|| StorageError::Corruption {
                    id: id.to_string(),
                    reason: "row has neither payload nor payload_blob".into(),
                })?,
        };

        let payload = compression::decode(&bytes).map_err(|e| corrupt(id, e))?;

        Ok(PersistedEntry {
            record: CacheRecord { payload, fetched_at, expires_at },
            url,
        })
    }
}

fn corrupt(id: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Corruption {
        id: id.to_string(),
        reason: err.to_string(),
    }
}

/// Read a text column as `String` (SQLite TEXT) or bytes (MySQL LONGTEXT).
fn read_text(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

#[async_trait]
impl DurableStore for SqlDurableStore {
    async fn get(&self, id: &str) -> Result<Option<PersistedEntry>, StorageError> {
        let sql = format!(
            "SELECT url, payload, payload_blob, fetched_at, expires_at FROM {} WHERE id = ?",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(|row| Self::row_to_entry(id, &row)).transpose()
    }

    async fn put(&self, id: &str, entry: &PersistedEntry) -> Result<(), StorageError> {
        let stored = compression::encode(&entry.record.payload)
            .map_err(|e| StorageError::Backend(format!("Failed to encode payload: {}", e)))?;
        let (text, blob) = match stored {
            StoredPayload::Text(text) => (Some(text), None),
            StoredPayload::Compressed(bytes) => (None, Some(bytes)),
        };
        let sql = self.upsert_sql();

        retry("sql_put", &RetryConfig::write(), || async {
            sqlx::query(&sql)
                .bind(id.to_string())
                .bind(entry.url.clone())
                .bind(text.clone())
                .bind(blob.clone())
                .bind(entry.record.fetched_at)
                .bind(entry.record.expires_at)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        retry("sql_delete", &RetryConfig::write(), || async {
            sqlx::query(&sql)
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {}", self.table);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn drop_all(&self, name: &str) -> Result<(), StorageError> {
        let target = table_name(name);
        let sql = format!("DROP TABLE IF EXISTS {}", target);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to drop {}: {}", target, e)))?;

        // Dropping our own table must leave the store usable
        if target == self.table {
            self.init_schema().await?;
        }
        debug!(table = %target, "Dropped durable store table");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sql"
    }
}
