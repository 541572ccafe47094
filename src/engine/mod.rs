// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fetch engine orchestrator.
//!
//! The [`FetchEngine`] ties the components together:
//! - memory tier (DashMap, synchronous)
//! - persistent tier (durable store behind a circuit breaker)
//! - in-flight registry (one transport call per id at a time)
//! - performance tracker and telemetry
//!
//! Every fetch normalizes its descriptor once, consults the tiers its
//! strategy calls for, goes to the network on a miss, and writes fresh
//! results through to every active tier.
//!
//! # Example
//!
//! ```rust,no_run
//! use fetch_engine::{FetchConfig, FetchEngine, RequestDescriptor};
//! use fetch_engine::transport::http::HttpTransport;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(HttpTransport::new(Duration::from_secs(10))?);
//! let config = FetchConfig {
//!     persistent_url: Some("sqlite:fetch_cache.db?mode=rwc".into()),
//!     ..Default::default()
//! };
//! let engine = FetchEngine::builder(transport).config(config).open().await;
//!
//! let users = engine
//!     .fetch_stale_tolerant(&RequestDescriptor::get("https://api.example.com/users"))
//!     .await?;
//! println!("{} from {}", users.payload, users.source);
//! # Ok(())
//! # }
//! ```

mod invalidation;
mod registry;
mod strategies;
mod types;

pub use registry::EngineRegistry;
pub use types::{DeleteOptions, EngineStats, FetchResponse, FreshnessPromise, InvalidationOptions};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{FetchConfig, FetchHooks};
use crate::debug_channel::DebugChannel;
use crate::error::FetchError;
use crate::inflight::InFlightRegistry;
use crate::insight::PerformanceTracker;
use crate::request::{InternalRequest, RequestDescriptor, Strategy};
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::storage::traits::{DurableStore, StorageError};
use crate::telemetry::{Action, Source, Telemetry, TelemetryErrorEvent};
use crate::tier::{MemoryTier, PersistentTier};
use crate::transport::Transport;

/// Two-tier cache fetch orchestrator.
///
/// Cheap to clone; clones share all state. Background refreshes hold a clone.
#[derive(Clone)]
pub struct FetchEngine {
    pub(super) config: Arc<RwLock<FetchConfig>>,
    pub(super) memory: Arc<MemoryTier>,
    pub(super) persistent: Arc<PersistentTier>,
    pub(super) inflight: Arc<InFlightRegistry>,
    pub(super) tracker: Arc<PerformanceTracker>,
    pub(super) telemetry: Arc<Telemetry>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) clock: Arc<dyn Clock>,
}

/// Builder for [`FetchEngine`].
pub struct FetchEngineBuilder {
    transport: Arc<dyn Transport>,
    config: FetchConfig,
    hooks: FetchHooks,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn DurableStore>>,
    circuit: CircuitConfig,
}

impl FetchEngineBuilder {
    #[must_use]
    pub fn config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn hooks(mut self, hooks: FetchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use an already-open durable store instead of `persistent_url`.
    #[must_use]
    pub fn durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn circuit(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = circuit;
        self
    }

    /// Build without connecting anything.
    pub fn build(self) -> FetchEngine {
        let channel = Arc::new(DebugChannel::new(
            self.config.tool_name.clone(),
            self.config.debug_channel_capacity,
            self.config.signatures_enabled,
        ));
        let telemetry = Arc::new(Telemetry::new(self.hooks, channel));
        let persistent = PersistentTier::with_circuit(self.store, telemetry.clone(), self.circuit);

        FetchEngine {
            config: Arc::new(RwLock::new(self.config)),
            memory: Arc::new(MemoryTier::new()),
            persistent: Arc::new(persistent),
            inflight: Arc::new(InFlightRegistry::new()),
            tracker: Arc::new(PerformanceTracker::new(self.clock.clone())),
            telemetry,
            transport: self.transport,
            clock: self.clock,
        }
    }

    /// Build and connect `persistent_url` if set.
    ///
    /// A store that cannot be opened is reported and left detached; the
    /// engine still works, with the persistent tier as a permanent miss.
    pub async fn open(self) -> FetchEngine {
        let engine = self.build();
        if !engine.persistent.is_available() {
            let _ = engine.connect_persistent().await;
        }
        engine
    }
}

impl FetchEngine {
    pub fn builder(transport: Arc<dyn Transport>) -> FetchEngineBuilder {
        FetchEngineBuilder {
            transport,
            config: FetchConfig::default(),
            hooks: FetchHooks::default(),
            clock: Arc::new(SystemClock),
            store: None,
            circuit: CircuitConfig::default(),
        }
    }

    /// Engine with default hooks and the system clock; no durable store.
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).config(config).build()
    }

    /// Open `persistent_url` and attach it as the persistent tier.
    ///
    /// Returns `Ok(false)` when no url is configured.
    pub async fn connect_persistent(&self) -> Result<bool, StorageError> {
        let (url, name) = {
            let config = self.config.read();
            (config.persistent_url.clone(), config.persistent_store_name.clone())
        };
        let Some(url) = url else {
            return Ok(false);
        };

        match crate::storage::connect(&url, &name).await {
            Ok(store) => {
                info!(backend = store.backend(), store = %name, "Persistent tier connected");
                self.persistent.attach(store);
                Ok(true)
            }
            Err(e) => {
                warn!(store = %name, error = %e, "Persistent tier unavailable, continuing memory-only");
                self.telemetry.error(TelemetryErrorEvent::new(
                    Source::Persistent,
                    Action::Failure,
                    name,
                    url,
                    e.clone(),
                ));
                Err(e)
            }
        }
    }

    /// Attach an already-open durable store.
    pub fn attach_durable_store(&self, store: Arc<dyn DurableStore>) {
        self.persistent.attach(store);
    }

    /// Replace the engine configuration.
    ///
    /// Takes effect for requests normalized after the call. The debug
    /// channel's signature flag follows `signatures_enabled` only when the
    /// setting changes, so an unrelated update keeps a devtools toggle.
    pub fn configure(&self, config: FetchConfig) {
        let mut current = self.config.write();
        if current.signatures_enabled != config.signatures_enabled {
            self.telemetry.channel().set_signatures(config.signatures_enabled);
        }
        *current = config;
    }

    pub fn set_hooks(&self, hooks: FetchHooks) {
        self.telemetry.set_hooks(hooks);
    }

    /// Apply every config published on `rx` until its sender is dropped.
    pub fn watch_config(&self, mut rx: watch::Receiver<FetchConfig>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let config = rx.borrow_and_update().clone();
                info!("Applying updated fetch config");
                engine.configure(config);
            }
        })
    }

    #[must_use]
    pub fn config(&self) -> FetchConfig {
        self.config.read().clone()
    }

    /// Debug channel for devtools.
    #[must_use]
    pub fn debug_channel(&self) -> Arc<DebugChannel> {
        self.telemetry.channel().clone()
    }

    #[must_use]
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    #[must_use]
    pub fn persistent(&self) -> &PersistentTier {
        &self.persistent
    }

    #[must_use]
    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            memory_entries: self.memory.len(),
            inflight_requests: self.inflight.len(),
            insights: self.tracker.len(),
            persistent_backend: self.persistent.backend(),
            signatures_enabled: self.telemetry.channel().signatures_enabled(),
        }
    }

    /// Derive id and tier lifespans under the current configuration.
    pub(super) fn normalize(
        &self,
        descriptor: &RequestDescriptor,
        strategy: Strategy,
    ) -> Result<InternalRequest, FetchError> {
        let config = self.config.read();
        InternalRequest::normalize(descriptor, strategy, &config)
    }

    pub(super) fn cache_enabled(&self) -> bool {
        self.config.read().cache_enabled
    }
}
