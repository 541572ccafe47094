// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persistent tier adapter over a [`DurableStore`].
//!
//! Failure policy:
//! - `get`, `put`, `delete`, `clear` and `drop_store` never fail. Errors are
//!   reported to telemetry (which logs them) and treated as a miss or a no-op.
//! - `try_get` propagates, for the one strategy that wants store failures
//!   to abort the fetch.
//! - With no store attached, every operation is a no-op miss.
//!
//! All store calls go through a circuit breaker, so a dead store costs a
//! rejected call rather than a timeout per request.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::record::CacheRecord;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::storage::traits::{DurableStore, PersistedEntry, StorageError};
use crate::telemetry::{Action, Source, Telemetry, TelemetryErrorEvent};

fn flatten(err: CircuitError<StorageError>) -> StorageError {
    match err {
        CircuitError::Rejected => StorageError::Unavailable,
        CircuitError::Inner(e) => e,
    }
}

pub struct PersistentTier {
    store: RwLock<Option<Arc<dyn DurableStore>>>,
    circuit: CircuitBreaker,
    telemetry: Arc<Telemetry>,
}

impl PersistentTier {
    pub fn new(store: Option<Arc<dyn DurableStore>>, telemetry: Arc<Telemetry>) -> Self {
        Self::with_circuit(store, telemetry, CircuitConfig::default())
    }

    pub fn with_circuit(
        store: Option<Arc<dyn DurableStore>>,
        telemetry: Arc<Telemetry>,
        circuit: CircuitConfig,
    ) -> Self {
        Self {
            store: RwLock::new(store),
            circuit: CircuitBreaker::new("persistent", circuit),
            telemetry,
        }
    }

    /// Attach (or replace) the durable store.
    pub fn attach(&self, store: Arc<dyn DurableStore>) {
        debug!(backend = store.backend(), "Durable store attached");
        *self.store.write() = Some(store);
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.store.read().is_some()
    }

    #[must_use]
    pub fn backend(&self) -> Option<&'static str> {
        self.store.read().as_ref().map(|s| s.backend())
    }

    #[must_use]
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    fn store(&self) -> Option<Arc<dyn DurableStore>> {
        self.store.read().clone()
    }

    fn report(&self, action: Action, id: &str, url: &str, err: StorageError) {
        self.telemetry
            .error(TelemetryErrorEvent::new(Source::Persistent, action, id, url, err));
    }

    /// Read a record, propagating store failures.
    pub async fn try_get(&self, id: &str) -> Result<Option<CacheRecord>, StorageError> {
        let Some(store) = self.store() else {
            return Ok(None);
        };
        let entry = self
            .circuit
            .call(|| store.get(id))
            .await
            .map_err(flatten)?;
        Ok(entry.map(|e| e.record))
    }

    /// Read a record; failures are reported and become a miss.
    pub async fn get(&self, id: &str, url: &str) -> Option<CacheRecord> {
        match self.try_get(id).await {
            Ok(record) => record,
            Err(e) => {
                self.report(Action::Miss, id, url, e);
                None
            }
        }
    }

    /// Write a record. Returns whether it landed.
    pub async fn put(&self, id: &str, url: &str, record: CacheRecord) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        let entry = PersistedEntry {
            record,
            url: url.to_string(),
        };
        match self.circuit.call(|| store.put(id, &entry)).await.map_err(flatten) {
            Ok(()) => true,
            Err(e) => {
                self.report(Action::Write, id, url, e);
                false
            }
        }
    }

    pub async fn delete(&self, id: &str, url: &str) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        match self.circuit.call(|| store.delete(id)).await.map_err(flatten) {
            Ok(()) => true,
            Err(e) => {
                self.report(Action::Delete, id, url, e);
                false
            }
        }
    }

    pub async fn clear(&self) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        match self.circuit.call(|| store.clear()).await.map_err(flatten) {
            Ok(()) => true,
            Err(e) => {
                self.report(Action::Clear, "*", "", e);
                false
            }
        }
    }

    /// Destroy the durable store named `name`.
    pub async fn drop_store(&self, name: &str) -> bool {
        let Some(store) = self.store() else {
            return false;
        };
        match self.circuit.call(|| store.drop_all(name)).await.map_err(flatten) {
            Ok(()) => {
                debug!(store = name, "Durable store dropped");
                true
            }
            Err(e) => {
                self.report(Action::Clear, name, "", e);
                false
            }
        }
    }
}
