// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Payload encoding for the SQL durable store.
//!
//! Small payloads are stored as plain JSON text. With the `compression`
//! feature, payloads of at least [`COMPRESSION_THRESHOLD`] bytes are stored
//! zstd-compressed in a blob column instead. Reads detect the zstd magic
//! bytes, so rows written with or without the feature stay readable by a
//! build with it.
//!
//! ```toml
//! [dependencies]
//! fetch-engine = { version = "0.1", features = ["compression"] }
//! ```

use serde_json::Value;

/// Zstd magic bytes (little-endian): 0xFD2FB528
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Serialized payloads at or above this size are compressed
pub const COMPRESSION_THRESHOLD: usize = 4 * 1024;

#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("compression failed: {0}")]
    CompressFailed(String),

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    #[error("JSON parse failed: {0}")]
    JsonParseFailed(#[from] serde_json::Error),
}

/// How a payload is laid out in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredPayload {
    /// Plain JSON text
    Text(String),
    /// zstd-compressed JSON bytes
    Compressed(Vec<u8>),
}

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Serialize a payload, compressing it when large and the feature is on.
pub fn encode(value: &Value) -> Result<StoredPayload, CompressionError> {
    let text = serde_json::to_string(value)?;
    if text.len() < COMPRESSION_THRESHOLD {
        return Ok(StoredPayload::Text(text));
    }
    match compress(&text)? {
        Some(compressed) => Ok(StoredPayload::Compressed(compressed)),
        None => Ok(StoredPayload::Text(text)),
    }
}

#[cfg(feature = "compression")]
fn compress(text: &str) -> Result<Option<Vec<u8>>, CompressionError> {
    zstd::encode_all(text.as_bytes(), DEFAULT_COMPRESSION_LEVEL)
        .map(Some)
        .map_err(|e| CompressionError::CompressFailed(e.to_string()))
}

#[cfg(not(feature = "compression"))]
fn compress(_text: &str) -> Result<Option<Vec<u8>>, CompressionError> {
    Ok(None)
}

/// Decode a stored blob or text column back to JSON.
pub fn decode(data: &[u8]) -> Result<Value, CompressionError> {
    if is_compressed(data) {
        return decompress(data);
    }
    serde_json::from_slice(data).map_err(CompressionError::from)
}

#[cfg(feature = "compression")]
fn decompress(data: &[u8]) -> Result<Value, CompressionError> {
    let bytes = zstd::decode_all(data)
        .map_err(|e| CompressionError::DecompressFailed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(CompressionError::from)
}

#[cfg(not(feature = "compression"))]
fn decompress(_data: &[u8]) -> Result<Value, CompressionError> {
    Err(CompressionError::DecompressFailed(
        "payload is zstd-compressed but the `compression` feature is disabled".into(),
    ))
}
