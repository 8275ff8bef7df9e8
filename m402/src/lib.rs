#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for pay-per-call x402 settlement of tool invocations.
//!
//! This crate holds everything a payment-gated tool server and a paying
//! client share, independent of the transport carrying the tool calls:
//!
//! - [`proto`] - Wire format types (requirements, payloads, facilitator responses)
//! - [`encoding`] - The base64 payment token codec
//! - [`networks`] - Registry of known networks, their families and USDC deployments
//! - [`price`] - Conversion of fiat prices into atomic token amounts
//! - [`family`] - Per-family strategies for building requirements and matching signers
//! - [`requirements`] - The requirements builder dispatching over family strategies
//! - [`facilitator`] - The remote facilitator interface (`verify`, `settle`, `supported`)
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod encoding;
pub mod facilitator;
pub mod family;
pub mod networks;
pub mod price;
pub mod proto;
pub mod requirements;
