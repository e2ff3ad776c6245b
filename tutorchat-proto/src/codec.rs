//! JSON encoding and decoding for gateway payloads.
//!
//! Every gateway operation resolves to either its success payload or an
//! [`ErrorPayload`]. [`GatewayResult`] is that tagged union; [`decode_response`]
//! builds it from a raw response body and a success flag.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Failure payload returned by every gateway operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawErrorPayload")]
pub struct ErrorPayload {
    /// Human-readable failure description.
    pub detail: String,
}

impl ErrorPayload {
    /// Creates an error payload with the given detail.
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Servers sometimes send `detail` as a structured value (for example a
/// list of field validation errors) instead of a string.
#[derive(Deserialize)]
struct RawErrorPayload {
    #[serde(default)]
    detail: serde_json::Value,
}

impl From<RawErrorPayload> for ErrorPayload {
    fn from(raw: RawErrorPayload) -> Self {
        let detail = match raw.detail {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => "unknown error".to_string(),
            other => other.to_string(),
        };
        Self { detail }
    }
}

/// Outcome of a single gateway operation.
pub type GatewayResult<T> = Result<T, ErrorPayload>;

/// Encodes a payload as JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a payload from JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a raw gateway response into a [`GatewayResult`].
///
/// `success` selects which side of the union the body is decoded as. An
/// empty success body decodes as JSON `null`, so operations without a
/// payload can use `T = ()`.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the body does not match the
/// expected shape.
pub fn decode_response<T: DeserializeOwned>(
    success: bool,
    body: &[u8],
) -> Result<GatewayResult<T>, CodecError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    if success {
        decode(body).map(Ok)
    } else {
        decode::<ErrorPayload>(body).map(Err)
    }
}
