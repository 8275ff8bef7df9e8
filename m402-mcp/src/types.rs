//! Framework-agnostic MCP types used by the payment flow.
//!
//! These mirror the JSON shapes of MCP `tools/call` and `tools/list` closely
//! enough to be converted to and from any MCP SDK through `serde_json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters for calling an MCP tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolParams {
    /// The tool name to invoke.
    pub name: String,
    /// Arguments to pass to the tool.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Optional `_meta` field for protocol extensions (the payment token).
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CallToolParams {
    /// Creates parameters for `name` with the given arguments and no `_meta`.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            meta: None,
        }
    }
}

/// A single content item in a tool call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
#[non_exhaustive]
pub enum ContentItem {
    /// Text content.
    Text {
        /// The text value.
        text: String,
    },
}

impl ContentItem {
    /// Creates a new text content item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text content if this is a text item.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
        }
    }
}

/// Result of an MCP tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Content items returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentItem>,
    /// Whether the tool returned an error.
    #[serde(default, rename = "isError")]
    pub is_error: bool,
    /// Optional `_meta` field for protocol extensions.
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    /// Optional structured content.
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

impl CallToolResult {
    /// A successful result with a single text item.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            ..Default::default()
        }
    }

    /// An error result with a single text item.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: true,
            ..Default::default()
        }
    }

    /// Returns the first text item, if any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(ContentItem::as_text)
    }

    /// Inserts a `_meta` entry, creating the map if needed.
    pub fn insert_meta(&mut self, key: impl Into<String>, value: Value) {
        self.meta
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
    }
}

/// Per-request data supplied by the transport alongside the call.
///
/// `meta` is the request `_meta`; `headers` holds the HTTP headers of the
/// underlying request when the transport has any. Header lookup is
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    /// The request `_meta` object.
    pub meta: Option<Map<String, Value>>,
    /// Request headers, if the transport exposes them.
    pub headers: BTreeMap<String, String>,
}

impl RequestContext {
    /// Creates a context carrying the `_meta` of `params`.
    #[must_use]
    pub fn from_params(params: &CallToolParams) -> Self {
        Self {
            meta: params.meta.clone(),
            headers: BTreeMap::new(),
        }
    }

    /// Builder-style method: adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Looks up a header by name, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Tool annotations, including the payment hints of paid tools.
///
/// Unknown annotation fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// Set on tools registered as paid.
    #[serde(
        rename = "paymentHint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_hint: Option<bool>,
    /// Price of one call in US dollars.
    #[serde(
        rename = "paymentPriceUSD",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_price_usd: Option<f64>,
    /// Other annotation fields (e.g. `title`, `readOnlyHint`).
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ToolAnnotations {
    /// Returns `true` if the tool is marked as paid.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_hint.unwrap_or(false)
    }
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema of the arguments.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    /// Creates a tool with an empty object argument schema.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: empty_object_schema(),
            annotations: None,
        }
    }

    /// Builder-style method: sets the argument schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Builder-style method: sets the annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// The advertised tools.
    pub tools: Vec<Tool>,
    /// Pagination cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_tool_result_wire_names() {
        let mut result = CallToolResult::error("nope");
        result.insert_meta("k", Value::Bool(true));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "content": [{"type": "text", "text": "nope"}],
                "isError": true,
                "_meta": {"k": true}
            })
        );
    }

    #[test]
    fn test_annotations_keep_unknown_fields() {
        let json = serde_json::json!({
            "title": "Weather",
            "paymentHint": true,
            "paymentPriceUSD": 0.05
        });
        let annotations: ToolAnnotations = serde_json::from_value(json.clone()).unwrap();
        assert!(annotations.is_paid());
        assert_eq!(annotations.payment_price_usd, Some(0.05));
        assert_eq!(annotations.other["title"], "Weather");
        assert_eq!(serde_json::to_value(&annotations).unwrap(), json);
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let ctx = RequestContext::default().with_header("x-payment", "token");
        assert_eq!(ctx.header("X-PAYMENT"), Some("token"));
        assert_eq!(ctx.header("Authorization"), None);
    }
}
