// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for fetch-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for installing an exporter.
//!
//! # Metric Naming Convention
//! - `fetch_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//! - `_bytes` suffix for size histograms
//!
//! # Labels
//! - `tier`: memory, persistent, network
//! - `action`: hit, miss, stale, write, delete, wait, success, failure
//! - `strategy`: network_only, freshness_first, stale_tolerant, stale_tolerant_with_promise

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record one cache/network event (the same events telemetry emits)
pub fn record_cache_event(tier: &str, action: &str) {
    counter!(
        "fetch_engine_cache_events_total",
        "tier" => tier.to_string(),
        "action" => action.to_string()
    )
    .increment(1);
}

/// Record time spent in the transport for one exchange
pub fn record_network_latency(duration: Duration) {
    histogram!("fetch_engine_network_seconds").record(duration.as_secs_f64());
}

/// Record end-to-end latency of one fetch
pub fn record_fetch_latency(strategy: &str, duration: Duration) {
    histogram!(
        "fetch_engine_fetch_seconds",
        "strategy" => strategy.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record serialized payload size of a network response
pub fn record_payload_bytes(bytes: usize) {
    histogram!("fetch_engine_payload_bytes").record(bytes as f64);
}

/// Set number of transport calls currently in flight
pub fn set_inflight_requests(count: usize) {
    gauge!("fetch_engine_inflight_requests").set(count as f64);
}

/// Set current memory tier entry count
pub fn set_memory_entries(count: usize) {
    gauge!("fetch_engine_memory_entries").set(count as f64);
}

/// Record an error by tier and operation
pub fn record_error(tier: &str, operation: &str) {
    counter!(
        "fetch_engine_errors_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record circuit breaker call outcome
pub fn record_circuit_call(circuit: &str, outcome: &str) {
    counter!(
        "fetch_engine_circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// A timing guard that records fetch latency on drop
pub struct FetchTimer {
    strategy: &'static str,
    start: Instant,
}

impl FetchTimer {
    pub fn new(strategy: &'static str) -> Self {
        Self {
            strategy,
            start: Instant::now(),
        }
    }
}

impl Drop for FetchTimer {
    fn drop(&mut self) {
        record_fetch_latency(self.strategy, self.start.elapsed());
    }
}
