// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache record data structure.
//!
//! A [`CacheRecord`] is one cached value as it sits in either tier. Records
//! are never mutated in place; a newer fetch replaces them wholesale.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// One cached payload with its fetch and expiry timestamps (epoch millis).
///
/// # Example
///
/// ```
/// use fetch_engine::CacheRecord;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let record = CacheRecord::new(json!({"v": 1}), 1_000, Duration::from_secs(5));
/// assert_eq!(record.expires_at, 6_000);
/// assert!(!record.is_stale(5_999));
/// assert!(record.is_stale(6_000));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T = Value> {
    /// The cached response body
    pub payload: T,
    /// When the payload was obtained
    pub fetched_at: i64,
    /// `fetched_at + lifespan`
    pub expires_at: i64,
}

impl<T> CacheRecord<T> {
    pub fn new(payload: T, fetched_at: i64, lifespan: Duration) -> Self {
        let lifespan_ms = i64::try_from(lifespan.as_millis()).unwrap_or(i64::MAX);
        Self {
            payload,
            fetched_at,
            expires_at: fetched_at.saturating_add(lifespan_ms),
        }
    }

    /// A record whose expiration is at or before `now` is stale.
    #[must_use]
    #[inline]
    pub fn is_stale(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Milliseconds until expiry (zero once stale).
    #[must_use]
    pub fn remaining(&self, now: i64) -> Duration {
        Duration::from_millis(self.expires_at.saturating_sub(now).max(0) as u64)
    }
}
