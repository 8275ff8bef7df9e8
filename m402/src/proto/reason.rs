//! Well-known error codes carried in [`PaymentRequired::error`](super::PaymentRequired).
//!
//! Error codes are plain strings on the wire. Facilitators add their own
//! reasons (e.g. `insufficient_funds`), so consumers must treat these
//! constants as a non-exhaustive set.

/// No payment token was attached to the call.
pub const PAYMENT_REQUIRED: &str = "PAYMENT_REQUIRED";

/// The payment token could not be decoded or verified.
pub const INVALID_PAYMENT: &str = "INVALID_PAYMENT";

/// The operation ran but the payment could not be settled.
pub const SETTLEMENT_FAILED: &str = "SETTLEMENT_FAILED";

/// The configured price could not be converted into a token amount.
pub const PRICE_COMPUTE_FAILED: &str = "PRICE_COMPUTE_FAILED";
