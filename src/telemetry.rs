// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Telemetry hook.
//!
//! Every state transition of a fetch (hit, miss, write, delete, in-flight
//! wait, network success or failure) becomes one [`TelemetryEvent`]; failures
//! become a [`TelemetryErrorEvent`]. Each event goes to:
//!
//! - `tracing` (debug for info events; error for network failures, warn for tier errors)
//! - the `fetch_engine_cache_events_total` / `fetch_engine_errors_total` counters
//! - the caller's `on_info` / `on_error` callbacks
//! - the [`DebugChannel`] broadcast
//!
//! Emission never fails. A panicking callback is logged and swallowed.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use crate::config::FetchHooks;
use crate::debug_channel::DebugChannel;
use crate::error::FetchError;
use crate::insight::Insight;

/// Where an event happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Memory,
    Persistent,
    Network,
}

impl Source {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Memory => "memory",
            Source::Persistent => "persistent",
            Source::Network => "network",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Record found and unexpired
    Hit,
    /// Record found but expired
    Stale,
    Miss,
    Write,
    Delete,
    Clear,
    /// Joined a transport call already in flight
    Wait,
    Success,
    Failure,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Hit => "hit",
            Action::Stale => "stale",
            Action::Miss => "miss",
            Action::Write => "write",
            Action::Delete => "delete",
            Action::Clear => "clear",
            Action::Wait => "wait",
            Action::Success => "success",
            Action::Failure => "failure",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    pub source: Source,
    pub action: Action,
    pub id: String,
    pub url: String,
    pub insight: Option<Insight>,
    pub signature: Option<String>,
}

impl TelemetryEvent {
    pub fn new(source: Source, action: Action, id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            source,
            action,
            id: id.into(),
            url: url.into(),
            insight: None,
            signature: None,
        }
    }

    #[must_use]
    pub fn insight(mut self, insight: Option<Insight>) -> Self {
        self.insight = insight;
        self
    }

    #[must_use]
    pub fn signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryErrorEvent {
    pub source: Source,
    pub action: Action,
    pub id: String,
    pub url: String,
    pub error: FetchError,
}

impl TelemetryErrorEvent {
    pub fn new(
        source: Source,
        action: Action,
        id: impl Into<String>,
        url: impl Into<String>,
        error: impl Into<FetchError>,
    ) -> Self {
        Self {
            source,
            action,
            id: id.into(),
            url: url.into(),
            error: error.into(),
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "source": self.source,
            "action": self.action,
            "id": self.id,
            "url": self.url,
            "error": {"kind": self.error.kind(), "message": self.error.to_string()},
        })
    }
}

pub struct Telemetry {
    hooks: RwLock<FetchHooks>,
    channel: Arc<DebugChannel>,
}

impl Telemetry {
    pub fn new(hooks: FetchHooks, channel: Arc<DebugChannel>) -> Self {
        Self {
            hooks: RwLock::new(hooks),
            channel,
        }
    }

    #[must_use]
    pub fn hooks(&self) -> FetchHooks {
        self.hooks.read().clone()
    }

    pub fn set_hooks(&self, hooks: FetchHooks) {
        *self.hooks.write() = hooks;
    }

    #[must_use]
    pub fn channel(&self) -> &Arc<DebugChannel> {
        &self.channel
    }

    /// Content signature of `payload`, or `None` while signatures are off.
    ///
    /// The caller's `signature_transform` runs first so secrets can be
    /// stripped before hashing.
    #[must_use]
    pub fn signature(&self, payload: &Value) -> Option<String> {
        if !self.channel.signatures_enabled() {
            return None;
        }
        let transform = self.hooks.read().signature_transform.clone();
        let bytes = match transform {
            Some(f) => serde_json::to_vec(&f(payload)),
            None => serde_json::to_vec(payload),
        };
        bytes.ok().map(|b| hex::encode(Sha256::digest(&b)))
    }

    pub fn info(&self, event: TelemetryEvent) {
        debug!(
            source = %event.source,
            action = %event.action,
            id = %event.id,
            url = %event.url,
            "fetch event"
        );
        crate::metrics::record_cache_event(event.source.as_str(), event.action.as_str());

        let callback = self.hooks.read().on_info.clone();
        if let Some(cb) = callback {
            if catch_unwind(AssertUnwindSafe(|| cb(&event))).is_err() {
                warn!(id = %event.id, "on_info callback panicked");
            }
        }

        if self.channel.has_subscribers() {
            if let Ok(payload) = serde_json::to_value(&event) {
                self.channel.publish(payload);
            }
        }
    }

    pub fn error(&self, event: TelemetryErrorEvent) {
        match event.source {
            Source::Network => error!(
                id = %event.id,
                url = %event.url,
                error = %event.error,
                "Network fetch failed"
            ),
            _ => warn!(
                source = %event.source,
                action = %event.action,
                id = %event.id,
                url = %event.url,
                error = %event.error,
                "Cache tier error"
            ),
        }
        crate::metrics::record_error(event.source.as_str(), event.action.as_str());

        let callback = self.hooks.read().on_error.clone();
        if let Some(cb) = callback {
            if catch_unwind(AssertUnwindSafe(|| cb(&event))).is_err() {
                warn!(id = %event.id, "on_error callback panicked");
            }
        }

        if self.channel.has_subscribers() {
            self.channel.publish(event.to_json());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::StorageError;
    use parking_lot::Mutex;

    fn telemetry(signatures: bool) -> Telemetry {
        Telemetry::new(
            FetchHooks::default(),
            Arc::new(DebugChannel::new("t", 8, signatures)),
        )
    }

    #[test]
    fn test_signature_gated_by_flag() {
        let t = telemetry(false);
        assert!(t.signature(&json!({"a": 1})).is_none());

        t.channel().set_signatures(true);
        let sig = t.signature(&json!({"a": 1})).unwrap();
        assert_eq!(sig.len(), 64);
        assert_eq!(t.signature(&json!({"a": 1})), Some(sig));
    }

    #[test]
    fn test_signature_applies_transform() {
        let t = telemetry(true);
        let plain = t.signature(&json!({"a": 1})).unwrap();

        t.set_hooks(FetchHooks::default().signature_transform(|_| json!({"a": 1})));
        let redacted = t.signature(&json!({"a": 1, "token": "secret"})).unwrap();
        assert_eq!(plain, redacted);
    }

    #[test]
    fn test_info_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let t = telemetry(false);
        t.set_hooks(FetchHooks::default().on_info(move |e| sink.lock().push((e.source, e.action))));

        t.info(TelemetryEvent::new(Source::Memory, Action::Hit, "id", "/u"));
        assert_eq!(*seen.lock(), vec![(Source::Memory, Action::Hit)]);
    }

    #[test]
    fn test_panicking_callback_is_swallowed() {
        let t = telemetry(false);
        t.set_hooks(FetchHooks::default().on_error(|_| panic!("callback bug")));
        t.error(TelemetryErrorEvent::new(
            Source::Persistent,
            Action::Failure,
            "id",
            "/u",
            StorageError::Unavailable,
        ));
    }

    #[tokio::test]
    async fn test_events_broadcast_on_debug_channel() {
        let t = telemetry(false);
        let mut rx = t.channel().subscribe();

        t.info(TelemetryEvent::new(Source::Network, Action::Success, "id", "/u"));
        t.error(TelemetryErrorEvent::new(
            Source::Network,
            Action::Failure,
            "id",
            "/u",
            FetchError::Status { status: 500, url: "/u".into() },
        ));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.source, "t-agent");
        assert_eq!(first.payload["action"], "success");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.payload["error"]["kind"], "status");
    }
}
