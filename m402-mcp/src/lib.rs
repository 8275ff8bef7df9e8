#![cfg_attr(docsrs, feature(doc_cfg))]

//! Payment-gated MCP tool calls over the x402 protocol.
//!
//! A server marks some of its tools as paid. A call to a paid tool without a
//! payment token is answered with a structured payment-required error listing
//! the accepted [`PaymentRequirements`](m402::proto::PaymentRequirements).
//! A paying client picks a compatible requirement, asks for consent, signs a
//! payment and retries the call exactly once with the token attached.
//!
//! # Architecture
//!
//! The crate does not bind to a particular MCP SDK. Both sides are expressed
//! as small traits over framework-agnostic [`types`]:
//!
//! - [`server::McpServer`] is the base tool registry. [`server::X402Server`]
//!   wraps any implementation by composition and adds
//!   [`paid_tool`](server::X402AugmentedServer::paid_tool).
//! - [`client::McpClient`] is the base tool caller. [`client::X402Client`]
//!   wraps any implementation and adds
//!   [`call_tool_with_payment`](client::X402AugmentedClient::call_tool_with_payment).
//!
//! # Server Usage
//!
//! ```rust,ignore
//! use m402_mcp::server::{ToolRouter, X402AugmentedServer, X402Server};
//!
//! let mut server = X402Server::new(ToolRouter::new(), gate);
//! server.paid_tool("get_weather", "Weather lookup", price, schema, annotations, handler)?;
//! let result = server.call_tool(params, ctx).await;
//! ```
//!
//! # Client Usage
//!
//! ```rust,ignore
//! use m402_mcp::client::{X402AugmentedClient, X402Client, X402ClientConfig};
//!
//! let client = X402Client::new(
//!     session,
//!     wallet,
//!     &capabilities,
//!     credentials,
//!     X402ClientConfig::default(),
//! )?;
//! let result = client.call_tool_with_payment(Some(confirm), params).await?;
//! ```
//!
//! # Feature Flags
//!
//! - `http` - Builds the facilitator from configuration with `m402-http`
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod server;
pub mod types;

/// MCP `_meta` key carrying the payment token (client → server).
pub const PAYMENT_META_KEY: &str = "x402/payment";

/// MCP `_meta` key carrying the settlement receipt (server → client).
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// MCP `_meta` key carrying the payment-required payload (server → client).
pub const PAYMENT_ERROR_META_KEY: &str = "x402/error";

/// Request header consulted for the payment token when `_meta` carries none.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Key of the structured payload of a client-side payment outcome.
pub const CLIENT_ERROR_KEY: &str = "x402ClientError";
