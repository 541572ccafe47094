// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fetch strategies, the network path and the write-through path.
//!
//! | Strategy | Cache hit (fresh) | Cache hit (stale) | Miss |
//! |---|---|---|---|
//! | network-only | - | - | network |
//! | freshness-first | serve + rewrite | evict, go on | network |
//! | stale-tolerant | serve | serve, refresh in background | network |
//!
//! Memory is always consulted before persistent, and persistent only after
//! a definitive memory miss.

use std::future::Future;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, instrument, Instrument};

use super::types::{FetchResponse, FreshnessPromise};
use super::FetchEngine;
use crate::error::FetchError;
use crate::insight::Phase;
use crate::metrics::FetchTimer;
use crate::record::CacheRecord;
use crate::request::{InternalRequest, RequestDescriptor, Strategy};
use crate::telemetry::{Action, Source, TelemetryErrorEvent, TelemetryEvent};
use crate::transport::TransportResponse;

impl FetchEngine {
    /// Fetch with the strategy named on the descriptor.
    pub async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<FetchResponse, FetchError> {
        match descriptor.strategy {
            Strategy::NetworkOnly => self.fetch_network_only(descriptor).await,
            Strategy::FreshnessFirst => self.fetch_freshness_first(descriptor).await,
            Strategy::StaleTolerant => self.fetch_stale_tolerant(descriptor).await,
            Strategy::StaleTolerantWithPromise => self
                .fetch_stale_tolerant_with_promise(descriptor)
                .await
                .map(|(response, _)| response),
        }
    }

    /// Skip both tiers and go to the network. The result is still written
    /// through to every active tier.
    #[instrument(skip_all, fields(url = %descriptor.url))]
    pub async fn fetch_network_only(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<FetchResponse, FetchError> {
        let request = self.normalize(descriptor, Strategy::NetworkOnly)?;
        self.tracked(&request, self.network(&request)).await
    }

    /// Serve only unexpired cache data; otherwise fetch.
    ///
    /// Unlike the other strategies, a persistent-tier read failure aborts the
    /// call with [`FetchError::Storage`].
    #[instrument(skip_all, fields(url = %descriptor.url))]
    pub async fn fetch_freshness_first(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<FetchResponse, FetchError> {
        let request = self.normalize(descriptor, Strategy::FreshnessFirst)?;
        self.tracked(&request, self.freshness_first(&request)).await
    }

    /// Serve any cached value immediately, fresh or stale. Stale values are
    /// refreshed in a detached background task. Only a full miss waits on
    /// the network.
    #[instrument(skip_all, fields(url = %descriptor.url))]
    pub async fn fetch_stale_tolerant(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<FetchResponse, FetchError> {
        let request = self.normalize(descriptor, Strategy::StaleTolerant)?;
        self.tracked(&request, self.stale_tolerant(&request))
            .await
            .map(|(response, _)| response)
    }

    /// Stale-tolerant fetch plus a [`FreshnessPromise`] for the fresh value.
    #[instrument(skip_all, fields(url = %descriptor.url))]
    pub async fn fetch_stale_tolerant_with_promise(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<(FetchResponse, FreshnessPromise), FetchError> {
        let request = self.normalize(descriptor, Strategy::StaleTolerantWithPromise)?;
        self.tracked(&request, self.stale_tolerant(&request)).await
    }

    /// Run `work` under the overall insight timer. The insight is discarded
    /// when the last concurrent fetch for the id finishes or is dropped.
    pub(super) async fn tracked<F, T>(&self, request: &InternalRequest, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _timer = FetchTimer::new(request.strategy.as_str());
        let _insight = self.tracker.hold(&request.id);
        self.tracker.start_by_id(&request.id, None);
        let result = work.await;
        self.tracker.stop_by_id(&request.id, None);
        result
    }

    fn event(&self, source: Source, action: Action, request: &InternalRequest) -> TelemetryEvent {
        TelemetryEvent::new(source, action, &request.id, request.url())
            .insight(self.tracker.get(&request.id))
    }

    /// A served cache hit carries the payload signature like a network success.
    fn hit(&self, source: Source, request: &InternalRequest, record: &CacheRecord) -> TelemetryEvent {
        self.event(source, Action::Hit, request)
            .signature(self.telemetry.signature(&record.payload))
    }

    async fn freshness_first(&self, request: &InternalRequest) -> Result<FetchResponse, FetchError> {
        if request.memory.is_some() {
            self.tracker.start_by_id(&request.id, Some(Phase::Memory));
            let cached = self.memory.get(&request.id);
            self.tracker.stop_by_id(&request.id, Some(Phase::Memory));

            match cached {
                Some(record) if !record.is_stale(self.clock.now_millis()) => {
                    self.telemetry.info(self.hit(Source::Memory, request, &record));
                    return self.serve_fresh(request, record, Source::Memory).await;
                }
                Some(_) => {
                    self.telemetry.info(self.event(Source::Memory, Action::Stale, request));
                    self.memory.delete(&request.id);
                }
                None => self.telemetry.info(self.event(Source::Memory, Action::Miss, request)),
            }
        }

        if request.persistent.is_some() {
            self.tracker.start_by_id(&request.id, Some(Phase::Persistent));
            let cached = self.persistent.try_get(&request.id).await;
            self.tracker.stop_by_id(&request.id, Some(Phase::Persistent));

            let cached = match cached {
                Ok(cached) => cached,
                Err(e) => {
                    let err = FetchError::from(e);
                    self.telemetry.error(TelemetryErrorEvent::new(
                        Source::Persistent,
                        Action::Failure,
                        &request.id,
                        request.url(),
                        err.clone(),
                    ));
                    return Err(err);
                }
            };

            match cached {
                Some(record) if !record.is_stale(self.clock.now_millis()) => {
                    self.telemetry.info(self.hit(Source::Persistent, request, &record));
                    return self.serve_fresh(request, record, Source::Persistent).await;
                }
                Some(_) => {
                    self.telemetry.info(self.event(Source::Persistent, Action::Stale, request));
                    self.persistent.delete(&request.id, request.url()).await;
                }
                None => self.telemetry.info(self.event(Source::Persistent, Action::Miss, request)),
            }
        }

        self.fetch_if_expired(request, None).await
    }

    /// Serve a fresh record and rewrite it through the save path, which
    /// restarts its lifespan in every active tier.
    async fn serve_fresh(
        &self,
        request: &InternalRequest,
        record: CacheRecord,
        source: Source,
    ) -> Result<FetchResponse, FetchError> {
        self.save(request, &record.payload).await;
        self.fetch_if_expired(request, Some((record, source))).await
    }

    async fn stale_tolerant(
        &self,
        request: &InternalRequest,
    ) -> Result<(FetchResponse, FreshnessPromise), FetchError> {
        if !self.cache_enabled() {
            let response = self.network(request).await?;
            return Ok((response.clone(), FreshnessPromise::Ready(response)));
        }

        if request.memory.is_some() {
            self.tracker.start_by_id(&request.id, Some(Phase::Memory));
            let cached = self.memory.get(&request.id);
            self.tracker.stop_by_id(&request.id, Some(Phase::Memory));

            match cached {
                Some(record) => return Ok(self.serve_any(request, record, Source::Memory)),
                None => self.telemetry.info(self.event(Source::Memory, Action::Miss, request)),
            }
        }

        if request.persistent.is_some() {
            self.tracker.start_by_id(&request.id, Some(Phase::Persistent));
            let cached = self.persistent.get(&request.id, request.url()).await;
            self.tracker.stop_by_id(&request.id, Some(Phase::Persistent));

            match cached {
                Some(record) => {
                    if request.memory.is_some() {
                        self.memory.insert(&request.id, record.clone());
                    }
                    return Ok(self.serve_any(request, record, Source::Persistent));
                }
                None => self.telemetry.info(self.event(Source::Persistent, Action::Miss, request)),
            }
        }

        let response = self.network(request).await?;
        Ok((response.clone(), FreshnessPromise::Ready(response)))
    }

    /// Serve a cached record without waiting; schedule a refresh if stale.
    fn serve_any(
        &self,
        request: &InternalRequest,
        record: CacheRecord,
        source: Source,
    ) -> (FetchResponse, FreshnessPromise) {
        let stale = record.is_stale(self.clock.now_millis());
        let event = if stale {
            self.event(source, Action::Stale, request)
        } else {
            self.hit(source, request, &record)
        };
        self.telemetry.info(event);

        let promise = if stale {
            FreshnessPromise::Pending(self.spawn_refresh(request.clone(), record.clone(), source))
        } else {
            FreshnessPromise::None
        };
        (FetchResponse::cached(record.payload, source), promise)
    }

    /// Detached refresh of a stale record. Failures reach telemetry through
    /// the network path; nobody is obliged to await the handle.
    fn spawn_refresh(
        &self,
        request: InternalRequest,
        record: CacheRecord,
        source: Source,
    ) -> JoinHandle<Result<FetchResponse, FetchError>> {
        let engine = self.clone();
        let span = info_span!("background_refresh", id = %request.id);
        tokio::spawn(
            async move {
                let _insight = engine.tracker.hold(&request.id);
                let result = engine.fetch_if_expired(&request, Some((record, source))).await;
                if let Err(ref e) = result {
                    debug!(error = %e, "Background refresh failed");
                }
                result
            }
            .instrument(span),
        )
    }

    /// Network fetch unless `existing` is present and unexpired.
    pub(super) async fn fetch_if_expired(
        &self,
        request: &InternalRequest,
        existing: Option<(CacheRecord, Source)>,
    ) -> Result<FetchResponse, FetchError> {
        match existing {
            Some((record, source)) if !record.is_stale(self.clock.now_millis()) => {
                Ok(FetchResponse::cached(record.payload, source))
            }
            _ => self.network(request).await,
        }
    }

    /// Go to the network through the in-flight registry.
    pub(super) async fn network(&self, request: &InternalRequest) -> Result<FetchResponse, FetchError> {
        let engine = self.clone();
        let owned = request.clone();
        let dispatch = self
            .inflight
            .dispatch(&request.id, move || engine.transport_call(owned));

        if dispatch.joined {
            self.telemetry.info(self.event(Source::Network, Action::Wait, request));
        }

        let response = dispatch.call.await?;
        Ok(FetchResponse::network(response.body, response.status))
    }

    /// One transport exchange plus write-through. Runs once per dispatch no
    /// matter how many callers join it.
    ///
    /// The call outlives cancelled callers, so once settled it drops any
    /// insight it touched that no fetch holds anymore.
    async fn transport_call(self, request: InternalRequest) -> Result<TransportResponse, FetchError> {
        let result = self.exchange(&request).await;
        self.tracker.discard_unheld(&request.id);
        result
    }

    async fn exchange(&self, request: &InternalRequest) -> Result<TransportResponse, FetchError> {
        let hooks = self.telemetry.hooks();
        let mut outgoing = request.transport.clone();
        if let Some(ref before_send) = hooks.before_send {
            before_send(&mut outgoing);
        }

        self.tracker.start_by_id(&request.id, Some(Phase::Network));
        let started = Instant::now();
        let result = self.transport.send(&outgoing).await;
        crate::metrics::record_network_latency(started.elapsed());
        self.tracker.stop_by_id(&request.id, Some(Phase::Network));

        let response = match result {
            Ok(response) => response,
            Err(e) => return Err(self.network_failure(request, e.into())),
        };

        if let Some(ref after_receive) = hooks.after_receive {
            after_receive(&outgoing, &response);
        }

        if !response.is_success() {
            let err = FetchError::Status {
                status: response.status,
                url: request.url().to_string(),
            };
            return Err(self.network_failure(request, err));
        }

        self.tracker.attach_size(&request.id, &response.body);
        let signature = self.telemetry.signature(&response.body);
        self.telemetry
            .info(self.event(Source::Network, Action::Success, request).signature(signature));

        self.save(request, &response.body).await;
        Ok(response)
    }

    fn network_failure(&self, request: &InternalRequest, err: FetchError) -> FetchError {
        self.telemetry.error(TelemetryErrorEvent::new(
            Source::Network,
            Action::Failure,
            &request.id,
            request.url(),
            err.clone(),
        ));
        err
    }

    /// Write-through: memory and persistent independently, each only when
    /// active for this request. Persistent failures are reported, not raised.
    pub(super) async fn save(&self, request: &InternalRequest, payload: &Value) {
        let now = self.clock.now_millis();

        if let Some(lifespan) = request.memory {
            self.memory.put(&request.id, payload.clone(), now, lifespan);
            self.telemetry.info(self.event(Source::Memory, Action::Write, request));
        }

        if let Some(lifespan) = request.persistent {
            let record = CacheRecord::new(payload.clone(), now, lifespan);
            self.tracker.start_by_id(&request.id, Some(Phase::Persistent));
            let written = self.persistent.put(&request.id, request.url(), record).await;
            self.tracker.stop_by_id(&request.id, Some(Phase::Persistent));
            if written {
                self.telemetry.info(self.event(Source::Persistent, Action::Write, request));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::FetchConfig;
    use crate::request::TierConfig;
    use crate::storage::memory::InMemoryDurableStore;
    use crate::transport::{Transport, TransportError, TransportRequest};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Counter {
        calls: AtomicUsize,
        status: u16,
    }

    #[async_trait]
    impl Transport for Counter {
        async fn send(&self, _: &TransportRequest) -> Result<TransportResponse, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TransportResponse::new(self.status, json!({ "n": n })))
        }
    }

    fn engine(status: u16) -> (FetchEngine, Arc<Counter>, Arc<ManualClock>, Arc<InMemoryDurableStore>) {
        let transport = Arc::new(Counter { calls: AtomicUsize::new(0), status });
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(InMemoryDurableStore::default());
        let engine = FetchEngine::builder(transport.clone())
            .config(FetchConfig::default())
            .clock(clock.clone())
            .durable_store(store.clone())
            .build();
        (engine, transport, clock, store)
    }

    #[tokio::test]
    async fn test_save_respects_disabled_tiers() {
        let (engine, _t, _c, store) = engine(200);
        let req = RequestDescriptor::get("/a")
            .with_id("a")
            .persistent(TierConfig::Disabled);

        engine.fetch_network_only(&req).await.unwrap();
        assert!(engine.memory().contains("a"));
        assert!(!store.contains("a"));
    }

    #[tokio::test]
    async fn test_freshness_first_memory_hit_slides_expiry() {
        let (engine, transport, clock, _s) = engine(200);
        let req = RequestDescriptor::get("/a")
            .with_id("a")
            .memory(Duration::from_secs(10));

        engine.fetch_freshness_first(&req).await.unwrap();
        clock.advance(Duration::from_secs(8));
        let hit = engine.fetch_freshness_first(&req).await.unwrap();
        assert_eq!(hit.source, Source::Memory);

        clock.advance(Duration::from_secs(8));
        let again = engine.fetch_freshness_first(&req).await.unwrap();
        assert_eq!(again.source, Source::Memory);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_freshness_first_evicts_expired_memory() {
        let (engine, transport, clock, _s) = engine(200);
        let req = RequestDescriptor::get("/a")
            .with_id("a")
            .memory(Duration::from_secs(1))
            .persistent(TierConfig::Disabled);

        engine.fetch_freshness_first(&req).await.unwrap();
        clock.advance(Duration::from_secs(2));
        let refreshed = engine.fetch_freshness_first(&req).await.unwrap();

        assert_eq!(refreshed.source, Source::Network);
        assert_eq!(refreshed.payload, json!({"n": 2}));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_status_is_not_cached() {
        let (engine, _t, _c, store) = engine(503);
        let req = RequestDescriptor::get("/a").with_id("a");

        let err = engine.fetch_network_only(&req).await.unwrap_err();
        assert_eq!(err, FetchError::Status { status: 503, url: "/a".into() });
        assert!(!engine.memory().contains("a"));
        assert!(!store.contains("a"));
    }

    #[tokio::test]
    async fn test_insights_discarded_after_fetch() {
        let (engine, _t, _c, _s) = engine(200);
        engine.fetch(&RequestDescriptor::get("/a")).await.unwrap();
        assert_eq!(engine.stats().insights, 0);
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_tiers() {
        let (engine, transport, _c, _s) = engine(200);
        let err = engine.fetch(&RequestDescriptor::get("")).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidRequest(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
