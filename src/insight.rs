// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-request performance tracking.
//!
//! An [`Insight`] records how long a fetch spent overall and in each phase
//! (memory lookup, persistent lookup, network), plus the serialized payload
//! size. Insights are keyed by request id and must be discarded at the end of
//! every top-level fetch; nothing expires them otherwise.
//!
//! Starting or stopping a timer on an id with no insight creates one, so
//! out-of-order calls never fail.
//!
//! Concurrent fetches for one id share its insight. A fetch takes an
//! [`InsightGuard`] with [`PerformanceTracker::hold`]; the insight is
//! discarded when the last guard drops, including when a caller's future is
//! cancelled. Phase timings are shared too, so a second caller starting the
//! overall timer restarts the first caller's running marker. Per-call
//! timings under contention are approximate.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::clock::Clock;

/// A timed phase of a fetch. `None` in the tracker API means the overall timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Memory,
    Persistent,
    Network,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Memory => write!(f, "memory"),
            Phase::Persistent => write!(f, "persistent"),
            Phase::Network => write!(f, "network"),
        }
    }
}

/// One stopwatch. Repeated start/stop cycles accumulate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub started_at: Option<i64>,
    pub elapsed_ms: u64,
}

impl Marker {
    fn start(&mut self, now: i64) {
        self.started_at = Some(now);
    }

    fn stop(&mut self, now: i64) {
        if let Some(started) = self.started_at.take() {
            self.elapsed_ms += now.saturating_sub(started).max(0) as u64;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Timing and size record for one request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub total: Marker,
    pub memory: Marker,
    pub persistent: Marker,
    pub network: Marker,
    /// Serialized payload size in bytes, when it could be computed
    pub size: Option<usize>,
}

impl Insight {
    fn marker_mut(&mut self, phase: Option<Phase>) -> &mut Marker {
        match phase {
            None => &mut self.total,
            Some(Phase::Memory) => &mut self.memory,
            Some(Phase::Persistent) => &mut self.persistent,
            Some(Phase::Network) => &mut self.network,
        }
    }

    #[must_use]
    pub fn marker(&self, phase: Option<Phase>) -> &Marker {
        match phase {
            None => &self.total,
            Some(Phase::Memory) => &self.memory,
            Some(Phase::Persistent) => &self.persistent,
            Some(Phase::Network) => &self.network,
        }
    }
}

pub struct PerformanceTracker {
    insights: DashMap<String, Insight>,
    /// Live guards per id
    holders: DashMap<String, usize>,
    clock: Arc<dyn Clock>,
}

/// Keeps the insight for one id alive. Dropping the last guard for the id
/// discards the insight.
#[must_use = "the insight is discarded as soon as the guard drops"]
pub struct InsightGuard<'a> {
    tracker: &'a PerformanceTracker,
    id: String,
}

impl Drop for InsightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.id);
    }
}

impl PerformanceTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            insights: DashMap::new(),
            holders: DashMap::new(),
            clock,
        }
    }

    pub fn start_by_insight(&self, insight: &mut Insight, phase: Option<Phase>) {
        insight.marker_mut(phase).start(self.clock.now_millis());
    }

    pub fn stop_by_insight(&self, insight: &mut Insight, phase: Option<Phase>) {
        insight.marker_mut(phase).stop(self.clock.now_millis());
    }

    pub fn start_by_id(&self, id: &str, phase: Option<Phase>) {
        let mut insight = self.insights.entry(id.to_string()).or_default();
        self.start_by_insight(&mut insight, phase);
    }

    pub fn stop_by_id(&self, id: &str, phase: Option<Phase>) {
        let mut insight = self.insights.entry(id.to_string()).or_default();
        self.stop_by_insight(&mut insight, phase);
    }

    /// Record the serialized size of `payload`; an unserializable payload
    /// leaves the size unset.
    pub fn attach_size<T: Serialize + ?Sized>(&self, id: &str, payload: &T) {
        let size = serde_json::to_vec(payload).ok().map(|bytes| bytes.len());
        if let Some(bytes) = size {
            crate::metrics::record_payload_bytes(bytes);
        }
        self.insights.entry(id.to_string()).or_default().size = size;
    }

    /// Snapshot of the insight for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Insight> {
        self.insights.get(id).map(|entry| entry.value().clone())
    }

    /// Register one more holder of the insight for `id`.
    pub fn hold(&self, id: &str) -> InsightGuard<'_> {
        *self.holders.entry(id.to_string()).or_insert(0) += 1;
        InsightGuard {
            tracker: self,
            id: id.to_string(),
        }
    }

    #[must_use]
    pub fn is_held(&self, id: &str) -> bool {
        self.holders.contains_key(id)
    }

    fn release(&self, id: &str) {
        let last = self
            .holders
            .remove_if_mut(id, |_, count| {
                *count = count.saturating_sub(1);
                *count == 0
            })
            .is_some();
        if last {
            self.insights.remove(id);
        }
    }

    /// Drop the insight for `id` unless a guard still holds it.
    pub fn discard_unheld(&self, id: &str) {
        if !self.is_held(id) {
            self.insights.remove(id);
        }
    }

    pub fn discard(&self, id: &str) -> Option<Insight> {
        self.insights.remove(id).map(|(_, insight)| insight)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.insights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde::ser::Error as _;
    use serde_json::json;

    fn tracker() -> (Arc<ManualClock>, PerformanceTracker) {
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = PerformanceTracker::new(clock.clone());
        (clock, tracker)
    }

    #[test]
    fn test_phase_timers_measure_clock() {
        let (clock, tracker) = tracker();
        tracker.start_by_id("a", None);
        tracker.start_by_id("a", Some(Phase::Network));
        clock.advance(Duration::from_millis(40));
        tracker.stop_by_id("a", Some(Phase::Network));
        clock.advance(Duration::from_millis(10));
        tracker.stop_by_id("a", None);

        let insight = tracker.get("a").unwrap();
        assert_eq!(insight.network.elapsed_ms, 40);
        assert_eq!(insight.total.elapsed_ms, 50);
        assert_eq!(insight.memory, Marker::default());
    }

    #[test]
    fn test_stop_without_start_creates_empty_insight() {
        let (_clock, tracker) = tracker();
        tracker.stop_by_id("ghost", Some(Phase::Persistent));

        let insight = tracker.get("ghost").unwrap();
        assert_eq!(insight.persistent.elapsed_ms, 0);
        assert!(!insight.persistent.is_running());
    }

    #[test]
    fn test_repeated_cycles_accumulate() {
        let (clock, tracker) = tracker();
        let mut insight = Insight::default();
        for _ in 0..3 {
            tracker.start_by_insight(&mut insight, Some(Phase::Memory));
            clock.advance(Duration::from_millis(5));
            tracker.stop_by_insight(&mut insight, Some(Phase::Memory));
        }
        assert_eq!(insight.memory.elapsed(), Duration::from_millis(15));
    }

    #[test]
    fn test_attach_size() {
        let (_clock, tracker) = tracker();
        tracker.attach_size("a", &json!({"k": "v"}));
        assert_eq!(tracker.get("a").unwrap().size, Some(9));
    }

    #[test]
    fn test_attach_size_unserializable_omits() {
        struct Broken;
        impl Serialize for Broken {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("nope"))
            }
        }

        let (_clock, tracker) = tracker();
        tracker.attach_size("a", &Broken);
        assert_eq!(tracker.get("a").unwrap().size, None);
    }

    #[test]
    fn test_discard() {
        let (_clock, tracker) = tracker();
        tracker.start_by_id("a", None);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.discard("a").is_some());
        assert!(tracker.is_empty());
        assert!(tracker.discard("a").is_none());
    }

    #[test]
    fn test_last_guard_discards() {
        let (_clock, tracker) = tracker();
        let first = tracker.hold("a");
        let second = tracker.hold("a");
        tracker.start_by_id("a", None);

        drop(first);
        assert!(tracker.get("a").is_some());
        assert!(tracker.is_held("a"));

        drop(second);
        assert!(tracker.is_empty());
        assert!(!tracker.is_held("a"));
    }

    #[test]
    fn test_discard_unheld_spares_held_ids() {
        let (_clock, tracker) = tracker();
        let _guard = tracker.hold("a");
        tracker.attach_size("a", &json!(1));
        tracker.attach_size("b", &json!(2));

        tracker.discard_unheld("a");
        tracker.discard_unheld("b");
        assert!(tracker.get("a").is_some());
        assert!(tracker.get("b").is_none());
    }
}
