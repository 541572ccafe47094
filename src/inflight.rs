// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-flight registry: at most one concurrent transport call per request id.
//!
//! The first caller for an id starts the call; everyone arriving while it is
//! outstanding gets a clone of the same [`Shared`] future and observes the
//! same result, success or failure.
//!
//! Each registered call is also driven by a detached task, so it runs to
//! completion and leaves the registry even if every caller stops polling.
//! Removal happens once the call settles, whatever the outcome, so a failure
//! never poisons later requests for the same id.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::trace;

use crate::error::FetchError;
use crate::transport::TransportResponse;

pub type CallResult = Result<TransportResponse, FetchError>;
pub type SharedCall = Shared<BoxFuture<'static, CallResult>>;

/// Result of [`InFlightRegistry::dispatch`].
pub struct Dispatch {
    pub call: SharedCall,
    /// True when an existing call was joined instead of started
    pub joined: bool,
}

#[derive(Default)]
pub struct InFlightRegistry {
    calls: Arc<DashMap<String, (u64, SharedCall)>>,
    next_token: AtomicU64,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the outstanding call for `id`, or start one with `start`.
    ///
    /// `start` is only invoked when nothing is in flight for `id`. Must be
    /// called inside a tokio runtime.
    pub fn dispatch<F, Fut>(&self, id: &str, start: F) -> Dispatch
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let call = match self.calls.entry(id.to_string()) {
            Entry::Occupied(existing) => {
                trace!(id, "Joining in-flight call");
                return Dispatch {
                    call: existing.get().1.clone(),
                    joined: true,
                };
            }
            Entry::Vacant(slot) => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                let calls = Arc::clone(&self.calls);
                let key = id.to_string();
                let operation = start();

                let call = async move {
                    let result = match AssertUnwindSafe(operation).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Cancelled(format!("transport call for '{}' panicked", key))),
                    };
                    calls.remove_if(&key, |_, (t, _)| *t == token);
                    crate::metrics::set_inflight_requests(calls.len());
                    result
                }
                .boxed()
                .shared();

                slot.insert((token, call.clone()));
                call
            }
        };

        crate::metrics::set_inflight_requests(self.calls.len());
        tokio::spawn(call.clone());

        Dispatch { call, joined: false }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_concurrent_dispatch_starts_once() {
        let registry = InFlightRegistry::new();
        let started = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let s = started.clone();
        let first = registry.dispatch("x", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = rx.await;
                Ok(TransportResponse::ok(json!({"v": 1})))
            }
        });
        let s = started.clone();
        let second = registry.dispatch("x", move || {
            s.fetch_add(1, Ordering::SeqCst);
            async { Ok(TransportResponse::ok(json!("other"))) }
        });

        assert!(!first.joined);
        assert!(second.joined);
        assert!(registry.contains("x"));

        tx.send(()).unwrap();
        let (a, b) = tokio::join!(first.call, second.call);
        assert_eq!(a.unwrap().body, json!({"v": 1}));
        assert_eq!(b.unwrap().body, json!({"v": 1}));
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_removed() {
        let registry = InFlightRegistry::new();
        let first = registry.dispatch("x", || async {
            Err(FetchError::Transport(TransportError::Timeout))
        });
        let err = first.call.await.unwrap_err();
        assert_eq!(err, FetchError::Transport(TransportError::Timeout));
        assert!(!registry.contains("x"));

        let retry = registry.dispatch("x", || async { Ok(TransportResponse::ok(json!(2))) });
        assert!(!retry.joined);
        assert_eq!(retry.call.await.unwrap().body, json!(2));
    }

    #[tokio::test]
    async fn test_call_completes_without_awaiting_callers() {
        let registry = InFlightRegistry::new();
        let (tx, rx) = oneshot::channel();
        let dispatch = registry.dispatch("x", move || async move {
            let _ = tx.send(());
            Ok(TransportResponse::ok(json!(null)))
        });
        drop(dispatch);

        rx.await.unwrap();
        for _ in 0..10 {
            if registry.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_panic_maps_to_cancelled() {
        let registry = InFlightRegistry::new();
        let dispatch = registry.dispatch("x", || async {
            if true {
                panic!("transport bug");
            }
            Ok(TransportResponse::ok(json!(null)))
        });
        assert!(matches!(dispatch.call.await, Err(FetchError::Cancelled(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_ids_are_independent() {
        let registry = InFlightRegistry::new();
        let a = registry.dispatch("a", || async { Ok(TransportResponse::ok(json!("a"))) });
        let b = registry.dispatch("b", || async { Ok(TransportResponse::ok(json!("b"))) });
        assert!(!a.joined && !b.joined);
        assert_eq!(a.call.await.unwrap().body, json!("a"));
        assert_eq!(b.call.await.unwrap().body, json!("b"));
    }
}
