// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transport seam: one request/response exchange.
//!
//! The engine never talks to the network directly. It hands a normalized
//! [`TransportRequest`] to a [`Transport`] and gets back a status and body.
//! Only statuses in `200..=399` are treated as cacheable success; the engine
//! applies that rule, not the transport.

pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::request::{HttpMethod, RequestDescriptor};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out")]
    Timeout,
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

/// Normalized transport parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub base: Option<String>,
    pub params: BTreeMap<String, Value>,
    pub body: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl TransportRequest {
    /// `base` joined with `url` (absolute urls ignore `base`).
    #[must_use]
    pub fn full_url(&self) -> String {
        match self.base {
            Some(ref base) if !self.url.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), self.url.trim_start_matches('/'))
            }
            _ => self.url.clone(),
        }
    }

    /// Query parameters as strings (JSON strings unquoted).
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl From<&RequestDescriptor> for TransportRequest {
    fn from(descriptor: &RequestDescriptor) -> Self {
        Self {
            method: descriptor.method,
            url: descriptor.url.clone(),
            base: descriptor.base.clone(),
            params: descriptor.params.clone(),
            body: descriptor.body.clone(),
            headers: descriptor.headers.clone(),
        }
    }
}

/// Status code and decoded body of one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// 2xx and 3xx are the only cacheable outcomes.
    #[must_use]
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..=399).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::new(200, json!(null)).is_success());
        assert!(TransportResponse::new(304, json!(null)).is_success());
        assert!(TransportResponse::new(399, json!(null)).is_success());
        assert!(!TransportResponse::new(199, json!(null)).is_success());
        assert!(!TransportResponse::new(404, json!(null)).is_success());
        assert!(!TransportResponse::new(500, json!(null)).is_success());
    }

    #[test]
    fn test_from_descriptor_carries_headers() {
        let descriptor = RequestDescriptor::post("/items")
            .base("https://api.test")
            .param("q", json!("rust"))
            .param("page", json!(2))
            .body(json!({"name": "x"}))
            .header("authorization", "Bearer t");

        let req = TransportRequest::from(&descriptor);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.full_url(), "https://api.test/items");
        assert_eq!(req.headers.get("authorization").map(String::as_str), Some("Bearer t"));
        assert_eq!(
            req.query_pairs(),
            vec![("page".to_string(), "2".to_string()), ("q".to_string(), "rust".to_string())]
        );
    }
}
