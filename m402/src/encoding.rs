//! Payment token encoding and decoding.
//!
//! A payment token is the base64 (standard alphabet) encoding of the JSON
//! form of a [`PaymentPayload`]. Tokens travel opaquely in call metadata or
//! in the `X-PAYMENT` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;

use crate::proto::PaymentPayload;

/// Errors produced while decoding a payment token.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The token is not valid base64.
    #[error("payment token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not a JSON payment payload.
    #[error("payment token is not a valid payment payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decodes a payment token into a [`PaymentPayload`].
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`DecodeError::Base64`] if the token is not base64 and
/// [`DecodeError::Json`] if the decoded bytes are not a payment payload.
pub fn decode_payment(token: &str) -> Result<PaymentPayload, DecodeError> {
    let bytes = b64.decode(token.trim())?;
    let payload = serde_json::from_slice(&bytes)?;
    Ok(payload)
}

/// Encodes a [`PaymentPayload`] into a payment token.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_payment(payload: &PaymentPayload) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(payload)?;
    Ok(b64.encode(json))
}
