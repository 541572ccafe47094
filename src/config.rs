// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the fetch engine.
//!
//! Plain settings live in [`FetchConfig`] (deserializable, e.g. from a
//! config file); callbacks live in [`FetchHooks`].
//!
//! # Example
//!
//! ```
//! use fetch_engine::FetchConfig;
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults)
//! let config = FetchConfig::default();
//! assert!(config.cache_enabled);
//! assert_eq!(config.default_lifespan(), Duration::from_secs(300));
//!
//! // Persist to SQLite, cache only when asked to
//! let config = FetchConfig {
//!     persistent_url: Some("sqlite:fetch_cache.db?mode=rwc".into()),
//!     cache_by_default: false,
//!     ..Default::default()
//! };
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::telemetry::{TelemetryErrorEvent, TelemetryEvent};
use crate::transport::{TransportRequest, TransportResponse};

/// Configuration for the fetch engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FetchConfig {
    /// Global cache switch. When false every tier is bypassed.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Whether tiers left unset on a request get the default lifespan
    #[serde(default = "default_true")]
    pub cache_by_default: bool,

    /// Default lifespan for unset tiers, in milliseconds (default: 5 minutes)
    #[serde(default = "default_lifespan_ms")]
    pub default_lifespan_ms: u64,

    /// Initial state of the content-signature flag
    #[serde(default)]
    pub signatures_enabled: bool,

    /// Tool name used for debug channel `source` tags
    #[serde(default = "default_tool_name")]
    pub tool_name: String,

    /// Durable store connection string (`sqlite:`, `mysql:` or `redis://`)
    #[serde(default)]
    pub persistent_url: Option<String>,

    /// Table / key namespace for the durable store
    #[serde(default = "default_store_name")]
    pub persistent_store_name: String,

    /// Buffered messages per debug channel subscriber
    #[serde(default = "default_debug_channel_capacity")]
    pub debug_channel_capacity: usize,
}

fn default_true() -> bool { true }
fn default_lifespan_ms() -> u64 { 5 * 60 * 1000 } // 5 minutes
fn default_tool_name() -> String { "fetch-engine".to_string() }
fn default_store_name() -> String { "fetch_cache".to_string() }
fn default_debug_channel_capacity() -> usize { 256 }

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_enabled: default_true(),
            cache_by_default: default_true(),
            default_lifespan_ms: default_lifespan_ms(),
            signatures_enabled: false,
            tool_name: default_tool_name(),
            persistent_url: None,
            persistent_store_name: default_store_name(),
            debug_channel_capacity: default_debug_channel_capacity(),
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub fn default_lifespan(&self) -> Duration {
        Duration::from_millis(self.default_lifespan_ms)
    }
}

pub type InfoCallback = Arc<dyn Fn(&TelemetryEvent) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&TelemetryErrorEvent) + Send + Sync>;
pub type BeforeSendHook = Arc<dyn Fn(&mut TransportRequest) + Send + Sync>;
pub type AfterReceiveHook = Arc<dyn Fn(&TransportRequest, &TransportResponse) + Send + Sync>;
pub type SignatureTransform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Caller-supplied callbacks.
///
/// # Example
///
/// ```
/// use fetch_engine::FetchHooks;
///
/// let hooks = FetchHooks::default()
///     .on_info(|event| println!("{} {} {}", event.source, event.action, event.id))
///     .before_send(|req| { req.headers.insert("x-client".into(), "demo".into()); })
///     .signature_transform(|payload| {
///         let mut redacted = payload.clone();
///         if let Some(obj) = redacted.as_object_mut() {
///             obj.remove("token");
///         }
///         redacted
///     });
/// assert!(hooks.on_info.is_some());
/// ```
#[derive(Clone, Default)]
pub struct FetchHooks {
    pub on_info: Option<InfoCallback>,
    pub on_error: Option<ErrorCallback>,
    pub before_send: Option<BeforeSendHook>,
    pub after_receive: Option<AfterReceiveHook>,
    pub signature_transform: Option<SignatureTransform>,
}

impl FetchHooks {
    #[must_use]
    pub fn on_info(mut self, f: impl Fn(&TelemetryEvent) + Send + Sync + 'static) -> Self {
        self.on_info = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&TelemetryErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn before_send(mut self, f: impl Fn(&mut TransportRequest) + Send + Sync + 'static) -> Self {
        self.before_send = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn after_receive(
        mut self,
        f: impl Fn(&TransportRequest, &TransportResponse) + Send + Sync + 'static,
    ) -> Self {
        self.after_receive = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn signature_transform(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.signature_transform = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FetchHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchHooks")
            .field("on_info", &self.on_info.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("before_send", &self.before_send.is_some())
            .field("after_receive", &self.after_receive.is_some())
            .field("signature_transform", &self.signature_transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FetchConfig::default();
        assert!(config.cache_enabled);
        assert!(config.cache_by_default);
        assert!(!config.signatures_enabled);
        assert_eq!(config.tool_name, "fetch-engine");
        assert_eq!(config.persistent_store_name, "fetch_cache");
        assert!(config.persistent_url.is_none());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: FetchConfig =
            serde_json::from_str(r#"{"default_lifespan_ms": 1000, "cache_by_default": false}"#).unwrap();
        assert_eq!(config.default_lifespan(), Duration::from_secs(1));
        assert!(!config.cache_by_default);
        assert!(config.cache_enabled);
        assert_eq!(config.debug_channel_capacity, 256);
    }

    #[test]
    fn test_hooks_debug_hides_closures() {
        let hooks = FetchHooks::default().on_error(|_| {});
        let text = format!("{:?}", hooks);
        assert!(text.contains("on_error: true"));
        assert!(text.contains("on_info: false"));
    }
}
