//! Protocol types for x402 payment messages.
//!
//! This module defines the wire format exchanged between a paid tool server,
//! a paying client, and the facilitator that verifies and settles payments.
//! All types serialize to JSON using camelCase field names.
//!
//! # Key Types
//!
//! - [`PaymentRequirements`] - Payment terms issued by the server for one call
//! - [`PaymentPayload`] - Decoded form of a client payment token
//! - [`VerifyResponse`] / [`SettleResponse`] - Facilitator results
//! - [`SupportedResponse`] - Payment kinds a facilitator can handle
//! - [`PaymentRequired`] - Structured error payload of a rejected call
//! - [`PaymentReceipt`] - Settlement receipt attached to a successful call

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{VecSkipError, serde_as};

pub mod reason;

/// Protocol version used when none is configured.
pub const DEFAULT_X402_VERSION: u32 = 1;

/// A unit struct representing the string literal `"exact"`.
///
/// This is the only scheme the tool-call integration issues or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExactScheme;

impl ExactScheme {
    /// The string literal value: `"exact"`.
    pub const VALUE: &'static str = "exact";
}

impl std::fmt::Display for ExactScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(Self::VALUE)
    }
}

impl AsRef<str> for ExactScheme {
    fn as_ref(&self) -> &str {
        Self::VALUE
    }
}

impl PartialEq<str> for ExactScheme {
    fn eq(&self, other: &str) -> bool {
        other == Self::VALUE
    }
}

impl PartialEq<String> for ExactScheme {
    fn eq(&self, other: &String) -> bool {
        other == Self::VALUE
    }
}

/// Payment requirements set by the server for a single priced call.
///
/// # JSON Format
///
/// ```json
/// {
///   "scheme": "exact",
///   "network": "base-sepolia",
///   "maxAmountRequired": "50000",
///   "resource": "x402://get_weather",
///   "description": "Weather lookup",
///   "mimeType": "application/json",
///   "payTo": "0x...",
///   "maxTimeoutSeconds": 300,
///   "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
///   "extra": { "name": "USDC", "version": "2" }
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The symbolic network name (e.g., "base-sepolia").
    pub network: String,
    /// Atomic token amount as a decimal integer string.
    pub max_amount_required: String,
    /// Identifier of the priced operation.
    pub resource: String,
    /// Human-readable description of the operation.
    pub description: String,
    /// MIME type of the operation result.
    pub mime_type: String,
    /// Optional JSON schema for the operation output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    /// The recipient address, in the canonical form of the network family.
    pub pay_to: String,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// The token contract or mint address.
    pub asset: String,
    /// Network-family-specific data (EIP-712 domain or fee payer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// A signed payment authorization decoded from a client token.
///
/// The scheme-specific `payload` is carried opaquely; only the facilitator
/// interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    pub x402_version: u32,
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The network name (e.g., "base-sepolia").
    pub network: String,
    /// The scheme-specific signed payload.
    pub payload: serde_json::Value,
}

/// Body of the facilitator `/verify` and `/settle` requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest {
    /// Protocol version of the payload.
    pub x402_version: u32,
    /// The client payment payload.
    pub payment_payload: PaymentPayload,
    /// The requirements the payload is checked against.
    pub payment_requirements: PaymentRequirements,
}

impl FacilitatorRequest {
    /// Creates a request from a payload and the requirements it must satisfy.
    #[must_use]
    pub fn new(payload: &PaymentPayload, requirements: &PaymentRequirements) -> Self {
        Self {
            x402_version: payload.x402_version,
            payment_payload: payload.clone(),
            payment_requirements: requirements.clone(),
        }
    }
}

/// Describes a payment method supported by a facilitator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The x402 protocol version.
    pub x402_version: u32,
    /// The payment scheme identifier (e.g., "exact").
    pub scheme: String,
    /// The network name.
    pub network: String,
    /// Optional scheme-specific extra data (e.g., `{"feePayer": "..."}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl SupportedPaymentKind {
    /// Returns the fee payer advertised in `extra`, if any.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.as_ref()?.get("feePayer")?.as_str()
    }
}

/// Response from a facilitator's `/supported` endpoint.
///
/// Entries that fail to parse are skipped rather than failing the whole
/// response.
#[serde_as]
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedPaymentKind>,
}

/// Result returned by a facilitator after verifying a payment payload
/// against the provided payment requirements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// The address of the payer.
        payer: Option<String>,
    },
    /// The payload was well-formed but failed verification.
    Invalid {
        /// Facilitator-supplied reason; an open set of strings.
        reason: String,
        /// The payer address, if identifiable.
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// Constructs a successful verification response.
    #[must_use]
    pub const fn valid(payer: Option<String>) -> Self {
        Self::Valid { payer }
    }

    /// Constructs a failed verification response.
    #[must_use]
    pub const fn invalid(payer: Option<String>, reason: String) -> Self {
        Self::Invalid { reason, payer }
    }

    /// Returns `true` if the verification succeeded.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns the payer address, if the facilitator determined one.
    #[must_use]
    pub fn payer(&self) -> Option<&str> {
        match self {
            Self::Valid { payer } | Self::Invalid { payer, .. } => payer.as_deref(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                invalid_reason: None,
                payer: payer.clone(),
            },
            Self::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                invalid_reason: Some(reason.clone()),
                payer: payer.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            Ok(Self::Valid { payer: wire.payer })
        } else {
            Ok(Self::Invalid {
                reason: wire
                    .invalid_reason
                    .unwrap_or_else(|| reason::INVALID_PAYMENT.to_owned()),
                payer: wire.payer,
            })
        }
    }
}

/// Response from a payment settlement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// The address that paid.
        payer: Option<String>,
        /// The on-chain transaction identifier.
        transaction: String,
        /// The network where settlement occurred.
        network: String,
    },
    /// Settlement failed.
    Error {
        /// Facilitator-supplied reason for the failure.
        reason: String,
        /// The network where settlement was attempted.
        network: String,
        /// The payer address, if known.
        payer: Option<String>,
        /// The transaction identifier, if one was submitted.
        transaction: Option<String>,
    },
}

impl SettleResponse {
    /// Returns `true` if the settlement succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(default)]
    network: String,
}

impl Serialize for SettleResponse {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            Self::Success {
                payer,
                transaction,
                network,
            } => SettleResponseWire {
                success: true,
                error_reason: None,
                payer: payer.clone(),
                transaction: Some(transaction.clone()),
                network: network.clone(),
            },
            Self::Error {
                reason,
                network,
                payer,
                transaction,
            } => SettleResponseWire {
                success: false,
                error_reason: Some(reason.clone()),
                payer: payer.clone(),
                transaction: transaction.clone(),
                network: network.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            let transaction = wire
                .transaction
                .ok_or_else(|| serde::de::Error::missing_field("transaction"))?;
            Ok(Self::Success {
                payer: wire.payer,
                transaction,
                network: wire.network,
            })
        } else {
            Ok(Self::Error {
                reason: wire
                    .error_reason
                    .unwrap_or_else(|| reason::SETTLEMENT_FAILED.to_owned()),
                network: wire.network,
                payer: wire.payer,
                transaction: wire.transaction,
            })
        }
    }
}

/// Structured payload of a call rejected for payment reasons.
///
/// Placed in the result metadata and mirrored as the result's text content,
/// so a client can react without parsing free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version.
    pub x402_version: u32,
    /// Machine-readable error; an open set of strings.
    pub error: String,
    /// Requirements that would satisfy the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<Vec<PaymentRequirements>>,
    /// The payer address, when the facilitator reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl PaymentRequired {
    /// Creates a payload without requirements, e.g. for configuration failures.
    #[must_use]
    pub fn error(x402_version: u32, error: impl Into<String>) -> Self {
        Self {
            x402_version,
            error: error.into(),
            accepts: None,
            payer: None,
        }
    }

    /// Returns the accepted requirements, or an empty slice.
    #[must_use]
    pub fn accepts(&self) -> &[PaymentRequirements] {
        self.accepts.as_deref().unwrap_or_default()
    }
}

/// Settlement receipt attached to a successful paid call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    /// Always `true` for an attached receipt.
    pub success: bool,
    /// The on-chain transaction identifier.
    pub transaction: String,
    /// The network where settlement occurred.
    pub network: String,
    /// The address that paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl PaymentReceipt {
    /// Builds a receipt from a settlement response, if it succeeded.
    #[must_use]
    pub fn from_settlement(response: &SettleResponse) -> Option<Self> {
        match response {
            SettleResponse::Success {
                payer,
                transaction,
                network,
            } => Some(Self {
                success: true,
                transaction: transaction.clone(),
                network: network.clone(),
                payer: payer.clone(),
            }),
            SettleResponse::Error { .. } => None,
        }
    }
}
