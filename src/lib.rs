//! # Fetch Engine
//!
//! A client-side fetch orchestrator with a two-tier response cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Request Identity                        │
//! │  • Explicit id, or SHA-256 of method/url/base/params/body  │
//! │  • Per-tier lifespans resolved against FetchConfig         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Memory Tier (DashMap)                    │
//! │  • Synchronous, volatile, returns stale records too        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                        (definitive miss)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Persistent Tier (DurableStore)              │
//! │  • SQLite / MySQL / Redis behind a circuit breaker         │
//! │  • Failures degrade to a miss                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                         (miss / stale)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 In-Flight Registry → Transport              │
//! │  • One transport call per id at a time                     │
//! │  • Fresh results written through to every active tier      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetch_engine::{FetchConfig, FetchEngine, RequestDescriptor, TierConfig};
//! use fetch_engine::transport::http::HttpTransport;
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let transport = Arc::new(HttpTransport::new(Duration::from_secs(10)).unwrap());
//!     let engine = FetchEngine::builder(transport)
//!         .config(FetchConfig {
//!             persistent_url: Some("sqlite:fetch_cache.db?mode=rwc".into()),
//!             ..Default::default()
//!         })
//!         .open()
//!         .await;
//!
//!     let request = RequestDescriptor::get("/users")
//!         .base("https://api.example.com")
//!         .param("page", json!(1))
//!         .memory(Duration::from_secs(30))
//!         .persistent(TierConfig::Disabled);
//!
//!     // Network on first call, memory afterwards
//!     let users = engine.fetch_freshness_first(&request).await.unwrap();
//!     println!("{} ({})", users.payload, users.source);
//!
//!     // Serve whatever is cached and hear about the fresh value later
//!     let (now, later) = engine.fetch_stale_tolerant_with_promise(&request).await.unwrap();
//!     println!("{}", now.payload);
//!     if let Some(Ok(fresh)) = later.wait().await {
//!         println!("refreshed: {}", fresh.payload);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Strategies**: network-only, freshness-first, stale-tolerant (with an optional freshness promise)
//! - **Request Deduplication**: concurrent fetches of one id share a single transport call
//! - **Invalidation**: per-request delete, clear-all, store drop, force refetch, fetch-and-invalidate
//! - **Telemetry**: tracing, metrics, caller callbacks, and a devtools debug channel
//! - **Content Signatures**: optional SHA-256 of payloads, toggled from devtools
//! - **Circuit Breakers / Retry**: for the durable store
//! - **Compression**: zstd for large persisted payloads (`compression` feature)
//!
//! ## Modules
//!
//! - [`engine`]: the [`FetchEngine`] orchestrator and [`EngineRegistry`]
//! - [`request`]: descriptors, strategies, identity derivation
//! - [`tier`]: memory tier and persistent tier adapter
//! - [`storage`]: durable store backends (SQL, Redis, memory)
//! - [`inflight`]: in-flight request deduplication
//! - [`insight`]: per-request performance tracking
//! - [`telemetry`] / [`debug_channel`]: event fan-out and devtools bridge
//! - [`transport`]: transport seam and reqwest implementation
//! - [`resilience`]: circuit breaker and retry

pub mod clock;
pub mod compression;
pub mod config;
pub mod debug_channel;
pub mod engine;
pub mod error;
pub mod inflight;
pub mod insight;
pub mod metrics;
pub mod record;
pub mod request;
pub mod resilience;
pub mod storage;
pub mod telemetry;
pub mod tier;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FetchConfig, FetchHooks};
pub use debug_channel::{AgentMessage, DebugChannel};
pub use engine::{
    DeleteOptions, EngineRegistry, EngineStats, FetchEngine, FetchEngineBuilder, FetchResponse,
    FreshnessPromise, InvalidationOptions,
};
pub use error::FetchError;
pub use insight::{Insight, Phase};
pub use record::CacheRecord;
pub use request::{HttpMethod, RequestDescriptor, Strategy, TierConfig};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use storage::traits::{DurableStore, PersistedEntry, StorageError};
pub use telemetry::{Action, Source, TelemetryErrorEvent, TelemetryEvent};
pub use transport::{Transport, TransportError, TransportRequest, TransportResponse};
