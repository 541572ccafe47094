//! Integration Tests for Fetch Engine
//!
//! Exercises the engine against real durable stores: SQLite through a temp
//! file, Redis through testcontainers (no external docker-compose required).
//!
//! # Running Tests
//! ```bash
//! # SQLite tests
//! cargo test --test integration
//!
//! # Redis tests too (requires Docker)
//! cargo test --test integration -- --include-ignored
//!
//! # Run only happy-path tests
//! cargo test --test integration happy -- --include-ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: write-through, restarts, invalidation
//! - `failure_*` - Failure scenarios: store death, unreachable stores

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

use fetch_engine::{
    DeleteOptions, FetchConfig, FetchEngine, RequestDescriptor, Source, Transport, TransportError,
    TransportRequest, TransportResponse,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("fetch_cache.db").display())
}

/// Unique store name so runs sharing a backend never see each other's entries
fn store_name() -> String {
    format!("fetch_cache_{}", Uuid::new_v4().simple())
}

struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for Counting {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransportResponse::ok(json!({ "url": request.url, "call": n })))
    }
}

impl Counting {
    fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn open(url: &str, store: &str, transport: Arc<Counting>) -> FetchEngine {
    FetchEngine::builder(transport)
        .config(FetchConfig {
            persistent_url: Some(url.to_string()),
            persistent_store_name: store.to_string(),
            ..Default::default()
        })
        .open()
        .await
}

// =============================================================================
// SQLite
// =============================================================================

#[tokio::test]
async fn happy_sqlite_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let store = store_name();
    let req = RequestDescriptor::get("/users")
        .param("page", json!(1))
        .persistent(Duration::from_secs(3600));

    let first = Counting::new();
    {
        let engine = open(&url, &store, first.clone()).await;
        assert_eq!(engine.stats().persistent_backend, Some("sql"));
        engine.fetch_freshness_first(&req).await.unwrap();
    }
    assert_eq!(first.calls(), 1);

    let second = Counting::new();
    let engine = open(&url, &store, second.clone()).await;
    let served = engine.fetch_stale_tolerant(&req).await.unwrap();

    assert_eq!(served.source, Source::Persistent);
    assert_eq!(served.payload, json!({"url": "/users", "call": 1}));
    assert_eq!(second.calls(), 0);
    assert!(engine.memory().contains(&req.request_id()));
}

#[tokio::test]
async fn happy_sqlite_expired_entry_is_refetched() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let store = store_name();
    let req = RequestDescriptor::get("/short")
        .memory(fetch_engine::TierConfig::Disabled)
        .persistent(Duration::from_millis(50));

    let transport = Counting::new();
    let engine = open(&url, &store, transport.clone()).await;
    engine.fetch_freshness_first(&req).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let refreshed = engine.fetch_freshness_first(&req).await.unwrap();

    assert_eq!(refreshed.source, Source::Network);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn happy_sqlite_invalidation() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let store = store_name();
    let transport = Counting::new();
    let engine = open(&url, &store, transport.clone()).await;

    let a = RequestDescriptor::get("/a").with_id("a");
    let b = RequestDescriptor::get("/b").with_id("b");
    engine.fetch_network_only(&a).await.unwrap();
    engine.fetch_network_only(&b).await.unwrap();

    engine.delete_one(&a, DeleteOptions::persistent_only()).await.unwrap();
    engine.delete_one(&a, DeleteOptions::memory_only()).await.unwrap();
    assert_eq!(engine.fetch_stale_tolerant(&a).await.unwrap().source, Source::Network);

    engine.delete_all().await;
    assert_eq!(engine.fetch_stale_tolerant(&b).await.unwrap().source, Source::Network);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn happy_sqlite_drop_store_then_reuse() {
    let dir = TempDir::new().unwrap();
    let url = sqlite_url(&dir);
    let store = store_name();
    let transport = Counting::new();
    let engine = open(&url, &store, transport.clone()).await;

    let req = RequestDescriptor::get("/d").with_id("d");
    engine.fetch_network_only(&req).await.unwrap();
    engine.drop_persistent_store(&store).await;
    engine.delete_one(&req, DeleteOptions::memory_only()).await.unwrap();

    // the dropped table is recreated empty
    let response = engine.fetch_stale_tolerant(&req).await.unwrap();
    assert_eq!(response.source, Source::Network);
    assert_eq!(transport.calls(), 2);
}

// =============================================================================
// Redis
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_write_through_and_restart() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let url = format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379));
    let store = store_name();
    let req = RequestDescriptor::get("/r").with_id("r");

    let first = Counting::new();
    open(&url, &store, first.clone()).await.fetch_network_only(&req).await.unwrap();

    let second = Counting::new();
    let engine = open(&url, &store, second.clone()).await;
    assert_eq!(engine.stats().persistent_backend, Some("redis"));

    let served = engine.fetch_freshness_first(&req).await.unwrap();
    assert_eq!(served.source, Source::Persistent);
    assert_eq!(second.calls(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_delete_all() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let url = format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379));
    let store = store_name();

    let transport = Counting::new();
    let engine = open(&url, &store, transport.clone()).await;
    for i in 0..5 {
        engine.fetch_network_only(&RequestDescriptor::get(format!("/i/{i}"))).await.unwrap();
    }

    engine.delete_all().await;
    let response = engine.fetch_stale_tolerant(&RequestDescriptor::get("/i/0")).await.unwrap();
    assert_eq!(response.source, Source::Network);
    assert_eq!(transport.calls(), 6);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_death_degrades_to_network() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let url = format!("redis://127.0.0.1:{}", redis.get_host_port_ipv4(6379));
    let store = store_name();

    let transport = Counting::new();
    let engine = open(&url, &store, transport.clone()).await;
    let req = RequestDescriptor::get("/x").with_id("x");
    engine.fetch_network_only(&req).await.unwrap();

    redis.stop();
    engine.delete_one(&req, DeleteOptions::memory_only()).await.unwrap();

    let response = engine.fetch_stale_tolerant(&req).await.unwrap();
    assert_eq!(response.source, Source::Network);
    assert_eq!(transport.calls(), 2);
}
