// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Request descriptors and request identity.
//!
//! A [`RequestDescriptor`] is what callers hand to the engine. Before any tier
//! is touched it is normalized exactly once into an [`InternalRequest`]:
//!
//! - the id is taken verbatim when supplied, otherwise derived from
//!   method/url/base/params/body (headers never participate),
//! - each tier's [`TierConfig`] is resolved against the global [`FetchConfig`]
//!   into an `Option<Duration>` lifespan (`None` = bypass the tier).
//!
//! # Example
//!
//! ```
//! use fetch_engine::{RequestDescriptor, TierConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let a = RequestDescriptor::get("/users").param("page", json!(2)).header("x-trace", "1");
//! let b = RequestDescriptor::get("/users").param("page", json!(2)).header("x-trace", "2");
//! assert_eq!(a.request_id(), b.request_id());
//!
//! let pinned = RequestDescriptor::get("/users")
//!     .with_id("users")
//!     .memory(TierConfig::Lifespan(Duration::from_secs(5)))
//!     .persistent(TierConfig::Disabled);
//! assert_eq!(pinned.request_id(), "users");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::transport::TransportRequest;

/// HTTP verb of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tier cache configuration as the caller states it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TierConfig {
    /// Unset: use the engine's default lifespan (if caching by default)
    #[default]
    Default,
    /// Explicitly nulled: never read or write this tier for this request
    Disabled,
    /// Cache in this tier for the given lifespan
    Lifespan(Duration),
}

impl TierConfig {
    /// Resolve to an active lifespan, or `None` when the tier is bypassed.
    #[must_use]
    pub fn resolve(self, config: &FetchConfig) -> Option<Duration> {
        if !config.cache_enabled {
            return None;
        }
        match self {
            Self::Disabled => None,
            Self::Lifespan(lifespan) => Some(lifespan),
            Self::Default if config.cache_by_default => Some(config.default_lifespan()),
            Self::Default => None,
        }
    }
}

impl From<Duration> for TierConfig {
    fn from(lifespan: Duration) -> Self {
        Self::Lifespan(lifespan)
    }
}

/// Fetch strategy selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Always go to the network (still writes through)
    NetworkOnly,
    /// Serve only unexpired cache data, otherwise refetch
    #[default]
    FreshnessFirst,
    /// Serve any cached data immediately, refresh stale data in the background
    StaleTolerant,
    /// Like `StaleTolerant`, plus a handle to the eventual fresh value
    StaleTolerantWithPromise,
}

impl Strategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkOnly => "network_only",
            Self::FreshnessFirst => "freshness_first",
            Self::StaleTolerant => "stale_tolerant",
            Self::StaleTolerantWithPromise => "stale_tolerant_with_promise",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller's intent: transport parameters plus per-tier cache settings.
#[derive(Debug, Clone, Default)]
pub struct RequestDescriptor {
    /// Explicit request id; derived from the request shape when `None`
    pub id: Option<String>,
    pub method: HttpMethod,
    pub url: String,
    pub base: Option<String>,
    /// Query parameters (sorted, so insertion order never changes identity)
    pub params: BTreeMap<String, Value>,
    pub body: Option<Value>,
    /// Sent to the transport but excluded from identity
    pub headers: BTreeMap<String, String>,
    pub memory: TierConfig,
    pub persistent: TierConfig,
    /// Strategy used by [`crate::FetchEngine::fetch`]
    pub strategy: Strategy,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn memory(mut self, config: impl Into<TierConfig>) -> Self {
        self.memory = config.into();
        self
    }

    #[must_use]
    pub fn persistent(mut self, config: impl Into<TierConfig>) -> Self {
        self.persistent = config.into();
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// The id this request is cached under.
    ///
    /// An explicit id is returned unchanged. Otherwise the id is the hex
    /// SHA-256 of method, url, base, params and body. Each field is
    /// length-prefixed so `("ab", "c")` and `("a", "bc")` never collide.
    #[must_use]
    pub fn request_id(&self) -> String {
        if let Some(ref id) = self.id {
            return id.clone();
        }

        let mut hasher = Sha256::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        };

        field(self.method.as_str().as_bytes());
        field(self.url.as_bytes());
        field(self.base.as_deref().unwrap_or("").as_bytes());
        for (key, value) in &self.params {
            field(key.as_bytes());
            field(&canonical_json(value));
        }
        field(b"|body");
        match self.body {
            Some(ref body) => field(&canonical_json(body)),
            None => field(b""),
        }

        hex::encode(hasher.finalize())
    }

    /// Full diagnostic URL (`base` joined with `url`).
    #[must_use]
    pub fn full_url(&self) -> String {
        match self.base {
            Some(ref base) if !self.url.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), self.url.trim_start_matches('/'))
            }
            _ => self.url.clone(),
        }
    }
}

/// Serialize a JSON value with object keys sorted at every depth.
fn canonical_json(value: &Value) -> Vec<u8> {
    fn sorted(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let ordered: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sorted(v))).collect();
                serde_json::to_value(ordered).unwrap_or(Value::Null)
            }
            Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_vec(&sorted(value)).unwrap_or_default()
}

/// A normalized, read-only request.
#[derive(Debug, Clone)]
pub struct InternalRequest {
    pub id: String,
    pub strategy: Strategy,
    /// Resolved memory lifespan (`None` = bypassed)
    pub memory: Option<Duration>,
    /// Resolved persistent lifespan (`None` = bypassed)
    pub persistent: Option<Duration>,
    pub transport: TransportRequest,
    url: String,
}

impl InternalRequest {
    /// Derive the id and resolve tier configuration.
    ///
    /// Fails with [`FetchError::InvalidRequest`] for an empty url or an empty
    /// explicit id, before any tier is consulted.
    pub fn normalize(
        descriptor: &RequestDescriptor,
        strategy: Strategy,
        config: &FetchConfig,
    ) -> Result<Self, FetchError> {
        if descriptor.url.trim().is_empty() {
            return Err(FetchError::InvalidRequest("request url is empty".into()));
        }
        if matches!(descriptor.id.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(FetchError::InvalidRequest("explicit request id is empty".into()));
        }

        Ok(Self {
            id: descriptor.request_id(),
            strategy,
            memory: descriptor.memory.resolve(config),
            persistent: descriptor.persistent.resolve(config),
            transport: TransportRequest::from(descriptor),
            url: descriptor.full_url(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn caches_anywhere(&self) -> bool {
        self.memory.is_some() || self.persistent.is_some()
    }
}
