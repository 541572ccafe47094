// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-facing error type.

use thiserror::Error;

use crate::storage::traits::StorageError;
use crate::transport::TransportError;

/// Why a fetch failed.
///
/// Cloneable because every caller joined onto one deduplicated transport call
/// observes the same failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Malformed request descriptor (raised before any tier access)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The transport rejected the exchange
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// The exchange completed with a non-cacheable status
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    /// A cache tier failed (only surfaced by freshness-first)
    #[error("cache tier failed: {0}")]
    Storage(#[from] StorageError),

    /// The task driving a transport call died before settling
    #[error("transport task cancelled: {0}")]
    Cancelled(String),
}

impl FetchError {
    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::Storage(_) => "storage",
            Self::Cancelled(_) => "cancelled",
        }
    }
}
