// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Invalidation and eviction API.

use tracing::{debug, info, instrument};

use super::types::{DeleteOptions, FetchResponse, InvalidationOptions};
use super::FetchEngine;
use crate::error::FetchError;
use crate::request::{InternalRequest, RequestDescriptor, Strategy};
use crate::telemetry::{Action, Source, TelemetryEvent};

impl FetchEngine {
    /// Network-only fetch of `descriptor` that also evicts every request in
    /// `targets` from the selected tiers.
    ///
    /// Targets are evicted whatever the primary outcome, unless
    /// `options.require_success` is set and the fetch failed. The primary
    /// result (or error) is returned either way.
    #[instrument(skip_all, fields(url = %descriptor.url, targets = targets.len()))]
    pub async fn execute_with_invalidation(
        &self,
        descriptor: &RequestDescriptor,
        targets: &[RequestDescriptor],
        options: InvalidationOptions,
    ) -> Result<FetchResponse, FetchError> {
        let request = self.normalize(descriptor, Strategy::NetworkOnly)?;
        let targets = targets
            .iter()
            .map(|target| self.normalize(target, target.strategy))
            .collect::<Result<Vec<_>, _>>()?;

        let result = self.tracked(&request, self.network(&request)).await;

        if result.is_err() && options.require_success {
            debug!(id = %request.id, "Primary request failed, invalidation skipped");
        } else {
            for target in &targets {
                self.evict(target, options.tiers).await;
            }
        }

        result
    }

    /// Remove one request's entry. No tier selected means both.
    pub async fn delete_one(
        &self,
        descriptor: &RequestDescriptor,
        options: DeleteOptions,
    ) -> Result<(), FetchError> {
        let request = self.normalize(descriptor, descriptor.strategy)?;
        self.evict(&request, options).await;
        Ok(())
    }

    /// Clear both tiers entirely (logout, reset).
    pub async fn delete_all(&self) {
        self.memory.clear();
        self.telemetry
            .info(TelemetryEvent::new(Source::Memory, Action::Clear, "*", ""));

        if self.persistent.clear().await {
            self.telemetry
                .info(TelemetryEvent::new(Source::Persistent, Action::Clear, "*", ""));
        }
        info!("All cache tiers cleared");
    }

    /// Destroy the durable store named `name` (table / key namespace).
    pub async fn drop_persistent_store(&self, name: &str) {
        if self.persistent.drop_store(name).await {
            self.telemetry
                .info(TelemetryEvent::new(Source::Persistent, Action::Clear, name, ""));
            info!(store = name, "Durable store dropped");
        }
    }

    /// Evict the request from the selected tiers, then fetch it network-only.
    #[instrument(skip_all, fields(url = %descriptor.url))]
    pub async fn force_refetch(
        &self,
        descriptor: &RequestDescriptor,
        options: DeleteOptions,
    ) -> Result<FetchResponse, FetchError> {
        let request = self.normalize(descriptor, Strategy::NetworkOnly)?;
        self.evict(&request, options).await;
        self.tracked(&request, self.network(&request)).await
    }

    async fn evict(&self, request: &InternalRequest, options: DeleteOptions) {
        let (memory, persistent) = options.targets();

        if memory && self.memory.delete(&request.id) {
            self.telemetry.info(TelemetryEvent::new(
                Source::Memory,
                Action::Delete,
                &request.id,
                request.url(),
            ));
        }

        if persistent && self.persistent.delete(&request.id, request.url()).await {
            self.telemetry.info(TelemetryEvent::new(
                Source::Persistent,
                Action::Delete,
                &request.id,
                request.url(),
            ));
        }
    }
}
