//! The remote facilitator interface.
//!
//! A facilitator verifies payment payloads against requirements and settles
//! them on-chain. The tool-call integration only ever talks to it through the
//! [`FacilitatorClient`] trait; `m402-http` provides the HTTP implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse, VerifyResponse,
};

/// A boxed, `Send` future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Boxed error source carried by [`FacilitatorError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Transport-level failure talking to a facilitator.
///
/// Protocol outcomes such as an invalid payload are not errors; they are
/// reported through [`VerifyResponse::Invalid`] and [`SettleResponse::Error`].
#[derive(Debug, thiserror::Error)]
#[error("{context}")]
pub struct FacilitatorError {
    context: String,
    #[source]
    source: Option<BoxError>,
}

impl FacilitatorError {
    /// Creates an error from a context message alone.
    #[must_use]
    pub fn msg(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying source.
    #[must_use]
    pub fn with_source<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the context message.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Asynchronous interface to a remote facilitator.
///
/// All methods return [`BoxFuture`] so the trait stays object safe and can
/// be shared as `Arc<dyn FacilitatorClient>`.
pub trait FacilitatorClient: Send + Sync {
    /// Checks a payment payload against the requirements it claims to satisfy.
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, FacilitatorError>>;

    /// Settles a previously verified payment.
    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, FacilitatorError>>;

    /// Lists the payment kinds the facilitator can handle.
    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>>;
}

impl<T: FacilitatorClient + ?Sized> FacilitatorClient for Arc<T> {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, FacilitatorError>> {
        (**self).verify(payload, requirements)
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, FacilitatorError>> {
        (**self).settle(payload, requirements)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        (**self).supported()
    }
}
