// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! reqwest-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, Method};
use serde_json::Value;
use tracing::debug;

use super::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::request::HttpMethod;

/// HTTP transport with connection pooling and a per-request timeout.
///
/// Bodies are decoded as JSON; a non-JSON body comes back as a JSON string
/// and an empty body as `null`.
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_decode() || err.is_body() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = request.full_url();
        let mut builder = self
            .client
            .request(method(request.method), &url)
            .query(&request.query_pairs());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(classify)?;
        debug!(%url, status, bytes = bytes.len(), "HTTP exchange complete");

        Ok(TransportResponse::new(status, decode_body(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_body_variants() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(decode_body(b"plain text"), json!("plain text"));
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(method(HttpMethod::Get), Method::GET);
        assert_eq!(method(HttpMethod::Delete), Method::DELETE);
    }

    #[test]
    fn test_new_builds_client() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}
