//! HTTP facilitator client for pay-per-call x402 settlement.
//!
//! [`HttpFacilitatorClient`] implements [`m402::facilitator::FacilitatorClient`]
//! against a remote facilitator exposing `POST /verify`, `POST /settle` and
//! `GET /supported`.
//!
//! # Feature Flags
//!
//! - `telemetry` - Emits `tracing` spans for every facilitator request

pub mod facilitator_client;

pub use facilitator_client::{HttpFacilitatorClient, HttpFacilitatorError, SupportedCache};
