// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types returned by the fetch engine.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::FetchError;
use crate::telemetry::Source;

/// A fetch result tagged with the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub payload: Value,
    pub source: Source,
    /// Transport status; `None` for cache hits
    pub status: Option<u16>,
}

impl FetchResponse {
    pub(crate) fn cached(payload: Value, source: Source) -> Self {
        Self {
            payload,
            source,
            status: None,
        }
    }

    pub(crate) fn network(payload: Value, status: u16) -> Self {
        Self {
            payload,
            source: Source::Network,
            status: Some(status),
        }
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.source != Source::Network
    }

    /// Deserialize the payload into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Handle to the fresh value that follows a stale-tolerant response.
///
/// - `None`: the served value was fresh; nothing else is coming.
/// - `Ready`: the served value already came from the network.
/// - `Pending`: a background refresh is running.
#[derive(Debug)]
pub enum FreshnessPromise {
    None,
    Ready(FetchResponse),
    Pending(JoinHandle<Result<FetchResponse, FetchError>>),
}

impl FreshnessPromise {
    /// Whether a fresh value exists or is on its way.
    #[must_use]
    pub fn is_forthcoming(&self) -> bool {
        !matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// Wait for the fresh value. `None` when nothing is forthcoming.
    pub async fn wait(self) -> Option<Result<FetchResponse, FetchError>> {
        match self {
            Self::None => None,
            Self::Ready(response) => Some(Ok(response)),
            Self::Pending(handle) => Some(
                handle
                    .await
                    .unwrap_or_else(|e| Err(FetchError::Cancelled(e.to_string()))),
            ),
        }
    }
}

/// Which tiers a delete touches. Selecting neither means both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOptions {
    pub memory: bool,
    pub persistent: bool,
}

impl DeleteOptions {
    pub fn all() -> Self {
        Self { memory: true, persistent: true }
    }

    pub fn memory_only() -> Self {
        Self { memory: true, persistent: false }
    }

    pub fn persistent_only() -> Self {
        Self { memory: false, persistent: true }
    }

    /// `(memory, persistent)` with the "neither means both" rule applied.
    #[must_use]
    pub fn targets(self) -> (bool, bool) {
        if !self.memory && !self.persistent {
            (true, true)
        } else {
            (self.memory, self.persistent)
        }
    }
}

/// Options for [`super::FetchEngine::execute_with_invalidation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InvalidationOptions {
    /// Only invalidate when the primary fetch succeeded
    pub require_success: bool,
    /// Tiers to invalidate in
    pub tiers: DeleteOptions,
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub memory_entries: usize,
    pub inflight_requests: usize,
    /// Insights not yet discarded
    pub insights: usize,
    /// Durable store backend, if one is attached
    pub persistent_backend: Option<&'static str>,
    pub signatures_enabled: bool,
}
