// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named engine instances.
//!
//! One engine per durable store name, created on first use. The registry is
//! an ordinary value: hold it where the process keeps its long-lived state
//! and pass it (or the engines it hands out) explicitly.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::FetchEngine;

#[derive(Default)]
pub struct EngineRegistry {
    engines: Mutex<HashMap<String, FetchEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine registered under `name`, creating it with `create` if absent.
    pub fn get_or_create(&self, name: &str, create: impl FnOnce() -> FetchEngine) -> FetchEngine {
        let mut engines = self.engines.lock();
        engines
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(name, "Creating fetch engine");
                create()
            })
            .clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<FetchEngine> {
        self.engines.lock().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<FetchEngine> {
        self.engines.lock().remove(name)
    }

    /// Forget every engine. Clones already handed out keep working.
    pub fn reset(&self) {
        self.engines.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Null;

    #[async_trait]
    impl Transport for Null {
        async fn send(&self, _: &TransportRequest) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::ok(json!(null)))
        }
    }

    fn make() -> FetchEngine {
        FetchEngine::new(FetchConfig::default(), Arc::new(Null))
    }

    #[test]
    fn test_get_or_create_returns_shared_instance() {
        let registry = EngineRegistry::new();
        let a = registry.get_or_create("cache", make);
        let b = registry.get_or_create("cache", || panic!("must not be called"));

        a.memory().put("x", json!(1), 0, Duration::from_secs(1));
        assert!(b.memory().contains("x"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reset_forgets_engines() {
        let registry = EngineRegistry::new();
        let first = registry.get_or_create("cache", make);
        first.memory().put("x", json!(1), 0, Duration::from_secs(1));

        registry.reset();
        assert!(registry.is_empty());

        let second = registry.get_or_create("cache", make);
        assert!(!second.memory().contains("x"));
    }

    #[test]
    fn test_remove() {
        let registry = EngineRegistry::new();
        registry.get_or_create("a", make);
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
    }
}
