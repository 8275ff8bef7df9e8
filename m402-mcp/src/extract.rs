//! Reading and writing x402 data in MCP `_meta` fields.
//!
//! These functions work with [`serde_json::Value`] maps, making them
//! framework-agnostic and compatible with any MCP SDK implementation.

use m402::proto::{PaymentReceipt, PaymentRequired};
use serde_json::{Map, Value};

use crate::types::{CallToolParams, CallToolResult, ContentItem, RequestContext};
use crate::{PAYMENT_ERROR_META_KEY, PAYMENT_HEADER, PAYMENT_META_KEY, PAYMENT_RESPONSE_META_KEY};

/// Finds the payment token of an incoming call.
///
/// The `_meta` slot is consulted first and the `X-PAYMENT` header only when
/// the slot is absent or `null`. Any other non-string value in the slot
/// counts as no token. `None` means no payment was attached, which is not
/// an error.
///
/// # Examples
///
/// ```
/// use m402_mcp::extract::extract_payment_token;
/// use m402_mcp::types::RequestContext;
///
/// let ctx = RequestContext::default().with_header("x-payment", "dG9rZW4=");
/// assert_eq!(extract_payment_token(&ctx).as_deref(), Some("dG9rZW4="));
/// assert!(extract_payment_token(&RequestContext::default()).is_none());
/// ```
#[must_use]
pub fn extract_payment_token(ctx: &RequestContext) -> Option<String> {
    match ctx.meta.as_ref().and_then(|meta| meta.get(PAYMENT_META_KEY)) {
        Some(Value::String(token)) => Some(token.clone()),
        None | Some(Value::Null) => ctx.header(PAYMENT_HEADER).map(str::to_owned),
        Some(_) => None,
    }
}

/// Attaches a payment token to the `_meta` of outgoing call parameters.
///
/// Creates the `_meta` map if it doesn't exist and overwrites any token
/// already present.
pub fn attach_payment_token(params: &mut CallToolParams, token: String) {
    params
        .meta
        .get_or_insert_with(Map::new)
        .insert(PAYMENT_META_KEY.to_owned(), Value::String(token));
}

/// Builds the error result of a call rejected for payment reasons.
///
/// The payload goes to `_meta["x402/error"]` and, serialized, to the text
/// content.
#[must_use]
pub fn payment_required_result(payload: &PaymentRequired) -> CallToolResult {
    let value = serde_json::to_value(payload).unwrap_or(Value::Null);
    let mut result = CallToolResult::error(value.to_string());
    result.insert_meta(PAYMENT_ERROR_META_KEY, value);
    result
}

/// Extracts a [`PaymentRequired`] from a tool error result.
///
/// Looks at `_meta["x402/error"]` first, then at `structuredContent`, then
/// at each text item parsed as JSON. Returns `None` if the result is not an
/// error or carries no payload with a non-empty `accepts` list.
#[must_use]
pub fn extract_payment_required(result: &CallToolResult) -> Option<PaymentRequired> {
    if !result.is_error {
        return None;
    }

    if let Some(value) = result
        .meta
        .as_ref()
        .and_then(|meta| meta.get(PAYMENT_ERROR_META_KEY))
        && let Some(payload) = parse_payment_required(value)
    {
        return Some(payload);
    }

    if let Some(value) = &result.structured_content
        && let Some(payload) = parse_payment_required(value)
    {
        return Some(payload);
    }

    result
        .content
        .iter()
        .filter_map(ContentItem::as_text)
        .filter_map(|text| serde_json::from_str::<Value>(text).ok())
        .find_map(|value| parse_payment_required(&value))
}

/// Extracts the settlement receipt from a result's `_meta`.
#[must_use]
pub fn extract_payment_receipt(result: &CallToolResult) -> Option<PaymentReceipt> {
    let value = result.meta.as_ref()?.get(PAYMENT_RESPONSE_META_KEY)?;
    serde_json::from_value(value.clone()).ok()
}

/// Attaches a settlement receipt to a result's `_meta`, keeping its content.
///
/// # Errors
///
/// Returns `Err` if the receipt cannot be serialized.
pub fn attach_payment_receipt(
    result: &mut CallToolResult,
    receipt: &PaymentReceipt,
) -> Result<(), serde_json::Error> {
    let value = serde_json::to_value(receipt)?;
    result.insert_meta(PAYMENT_RESPONSE_META_KEY, value);
    Ok(())
}

fn parse_payment_required(value: &Value) -> Option<PaymentRequired> {
    let payload: PaymentRequired = serde_json::from_value(value.clone()).ok()?;
    (!payload.accepts().is_empty()).then_some(payload)
}

#[cfg(test)]
mod tests {
    use m402::proto::{PaymentRequirements, reason};
    use serde_json::json;

    use super::*;

    fn requirements() -> PaymentRequirements {
        serde_json::from_value(json!({
            "scheme": "exact",
            "network": "base-sepolia",
            "maxAmountRequired": "50000",
            "resource": "x402://get_weather",
            "description": "Weather lookup",
            "mimeType": "application/json",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxTimeoutSeconds": 300,
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        }))
        .unwrap()
    }

    #[test]
    fn test_meta_slot_wins_over_header() {
        let mut meta = Map::new();
        meta.insert(PAYMENT_META_KEY.to_owned(), json!("from-meta"));
        let ctx = RequestContext {
            meta: Some(meta),
            ..Default::default()
        }
        .with_header("X-Payment", "from-header");
        assert_eq!(extract_payment_token(&ctx).as_deref(), Some("from-meta"));
    }

    #[test]
    fn test_null_meta_slot_falls_back_to_header() {
        let mut meta = Map::new();
        meta.insert(PAYMENT_META_KEY.to_owned(), Value::Null);
        let ctx = RequestContext {
            meta: Some(meta),
            ..Default::default()
        }
        .with_header("X-PAYMENT", "header-token");
        assert_eq!(extract_payment_token(&ctx).as_deref(), Some("header-token"));
    }

    #[test]
    fn test_non_string_meta_slot_is_no_token() {
        let mut meta = Map::new();
        meta.insert(PAYMENT_META_KEY.to_owned(), json!({"x402Version": 1}));
        let ctx = RequestContext {
            meta: Some(meta),
            ..Default::default()
        }
        .with_header("X-PAYMENT", "header-token");
        assert_eq!(extract_payment_token(&ctx), None);
    }

    #[test]
    fn test_attach_token_keeps_other_meta() {
        let mut params = CallToolParams::new("get_weather", Map::new());
        params.meta = Some(Map::from_iter([("trace".to_owned(), json!("abc"))]));
        attach_payment_token(&mut params, "token".to_owned());
        let meta = params.meta.unwrap();
        assert_eq!(meta["trace"], "abc");
        assert_eq!(meta[PAYMENT_META_KEY], "token");
    }

    #[test]
    fn test_payment_required_roundtrip_through_result() {
        let payload = PaymentRequired {
            accepts: Some(vec![requirements()]),
            ..PaymentRequired::error(1, reason::PAYMENT_REQUIRED)
        };
        let result = payment_required_result(&payload);
        assert!(result.is_error);
        assert_eq!(extract_payment_required(&result), Some(payload.clone()));

        // Text fallback when a transport drops `_meta`.
        let stripped = CallToolResult {
            meta: None,
            ..result
        };
        assert_eq!(extract_payment_required(&stripped), Some(payload));
    }

    #[test]
    fn test_payment_required_without_accepts_is_ignored() {
        let result = payment_required_result(&PaymentRequired::error(
            1,
            reason::PRICE_COMPUTE_FAILED,
        ));
        assert!(extract_payment_required(&result).is_none());
    }

    #[test]
    fn test_success_result_is_never_payment_required() {
        let mut result = CallToolResult::text("sunny");
        result.structured_content = Some(json!({
            "x402Version": 1,
            "error": "PAYMENT_REQUIRED",
            "accepts": [requirements()]
        }));
        assert!(extract_payment_required(&result).is_none());
    }

    #[test]
    fn test_receipt_roundtrip() {
        let receipt = PaymentReceipt {
            success: true,
            transaction: "0xdeadbeef".to_owned(),
            network: "base-sepolia".to_owned(),
            payer: Some("0xpayer".to_owned()),
        };
        let mut result = CallToolResult::text("sunny");
        attach_payment_receipt(&mut result, &receipt).unwrap();
        assert_eq!(result.first_text(), Some("sunny"));
        assert_eq!(extract_payment_receipt(&result), Some(receipt));
    }
}
