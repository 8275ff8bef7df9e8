//! Error types for MCP x402 payment integration.
//!
//! [`McpPaymentError`] covers failures that propagate to the caller: the
//! transport, credential construction and tool registration.
//! [`ClientPaymentError`] covers the client-side payment outcomes that are
//! reported as tool results instead, so a caller can react to them without
//! a separate error path.

use m402::facilitator::BoxError;
use serde_json::json;

use crate::CLIENT_ERROR_KEY;
use crate::types::{CallToolResult, ContentItem};

/// Errors that can occur during MCP x402 payment operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum McpPaymentError {
    /// The underlying MCP transport failed.
    #[error("Tool call transport failed: {0}")]
    Transport(#[source] BoxError),

    /// The signer could not produce a payment credential.
    #[error("Failed to create payment: {0}")]
    CredentialCreation(#[source] BoxError),

    /// The signer is bound to a chain id missing from the network registry.
    #[error("Signer chain id {0} is not a known network")]
    UnsupportedSigner(u64),

    /// A tool with the same name is already registered.
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),
}

impl McpPaymentError {
    /// Wraps a transport failure.
    #[must_use]
    pub fn transport<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transport(source.into())
    }
}

/// A payment the client chose not to, or could not, make.
///
/// None of these outcomes issue a second call or construct a credential.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ClientPaymentError {
    /// The confirmation step refused the payment, or none was configured.
    #[error("User declined payment")]
    Declined,

    /// No advertised requirement matches the signer's networks.
    #[error("No compatible payment requirements found for this wallet")]
    NoCompatibleRequirements,

    /// The selected requirement exceeds the configured spend cap.
    #[error("Payment exceeds client cap: {required} > {cap}")]
    CapExceeded {
        /// The amount of the selected requirement; verbatim if unparsable.
        required: String,
        /// The configured cap, in atomic units.
        cap: String,
    },
}

impl ClientPaymentError {
    /// Returns the machine-readable code of the outcome.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Declined => "PAYMENT_DECLINED",
            Self::NoCompatibleRequirements => "NO_COMPATIBLE_REQUIREMENTS",
            Self::CapExceeded { .. } => "PAYMENT_EXCEEDS_CAP",
        }
    }

    /// Converts the outcome into an error result.
    ///
    /// The text content carries the human-readable message and
    /// `structuredContent` carries `{"x402ClientError": code, ...}`.
    #[must_use]
    pub fn to_result(&self) -> CallToolResult {
        let mut structured = json!({ CLIENT_ERROR_KEY: self.code() });
        if let Self::CapExceeded { required, cap } = self {
            structured["required"] = json!(required);
            structured["cap"] = json!(cap);
        }
        CallToolResult {
            content: vec![ContentItem::text(self.to_string())],
            is_error: true,
            meta: None,
            structured_content: Some(structured),
        }
    }

    /// Recognizes a result produced by [`to_result`](Self::to_result).
    #[must_use]
    pub fn from_result(result: &CallToolResult) -> Option<Self> {
        if !result.is_error {
            return None;
        }
        let structured = result.structured_content.as_ref()?;
        match structured.get(CLIENT_ERROR_KEY)?.as_str()? {
            "PAYMENT_DECLINED" => Some(Self::Declined),
            "NO_COMPATIBLE_REQUIREMENTS" => Some(Self::NoCompatibleRequirements),
            "PAYMENT_EXCEEDS_CAP" => Some(Self::CapExceeded {
                required: structured.get("required")?.as_str()?.to_owned(),
                cap: structured.get("cap")?.as_str()?.to_owned(),
            }),
            _ => None,
        }
    }
}
