//! JWT inspection for the security panel
//!
//! Decodes header and payload segments without verifying the signature,
//! and evaluates the `exp` claim against the current time.

use crate::error::{EngineError, EngineResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded (not verified) JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodedJwt {
    pub header: serde_json::Value,
    pub payload: serde_json::Value,
    /// Whether a third (signature) segment was present
    pub signature_present: bool,
    /// True when a numeric `exp` claim lies in the past
    pub expired: bool,
    /// Expiry instant derived from the `exp` claim
    pub expires_at: Option<DateTime<Utc>>,
}

/// Decode the header and payload segments of a token
///
/// Fails with `InvalidFormat` when fewer than two segments are present or
/// a segment is not base64url-encoded JSON. The signature is not checked.
pub fn decode_jwt(token: &str) -> EngineResult<DecodedJwt> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() < 2 {
        return Err(EngineError::invalid_format(
            "JWT must have at least header and payload segments",
        ));
    }

    let header = decode_segment(segments[0], "header")?;
    let payload = decode_segment(segments[1], "payload")?;

    let exp = payload.get("exp").and_then(|v| v.as_i64());
    let expires_at = exp.and_then(|secs| DateTime::from_timestamp(secs, 0));
    let expired = exp.map(|secs| secs <= Utc::now().timestamp()).unwrap_or(false);

    Ok(DecodedJwt {
        header,
        payload,
        signature_present: segments.len() > 2 && !segments[2].is_empty(),
        expired,
        expires_at,
    })
}

fn decode_segment(segment: &str, name: &str) -> EngineResult<serde_json::Value> {
    let bytes = BASE64_URL
        .decode(segment)
        .map_err(|e| EngineError::invalid_format(format!("JWT {} is not base64url: {}", name, e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::invalid_format(format!("JWT {} is not JSON: {}", name, e)))
}
