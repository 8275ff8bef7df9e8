//! A [`FacilitatorClient`] talking to a remote facilitator over HTTP.
//!
//! [`HttpFacilitatorClient`] posts [`FacilitatorRequest`] bodies to
//! `./verify` and `./settle` and reads `./supported`, all relative to a base
//! URL. The `/supported` answer changes rarely, so it is kept in a
//! [`SupportedCache`] with a TTL; fee payer discovery for fee-delegated
//! networks hits the cache instead of the network on most calls.
//!
//! ## Error Handling
//!
//! [`HttpFacilitatorError`] captures
//! - URL construction
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Unexpected HTTP status responses
//!
//! and converts into [`FacilitatorError`] at the trait boundary.

use std::fmt::Display;
use std::time::{Duration, Instant};

use http::{HeaderMap, StatusCode};
use m402::facilitator::{BoxFuture, FacilitatorClient, FacilitatorError};
use m402::proto::{
    FacilitatorRequest, PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse,
    VerifyResponse,
};
use reqwest::Client;
use tokio::sync::RwLock;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Instrument, Span, instrument};

#[derive(Clone, Debug)]
struct SupportedCacheState {
    response: SupportedResponse,
    expires_at: Instant,
}

/// TTL cache for the `/supported` endpoint response.
///
/// Each clone starts with an empty cache.
#[derive(Debug)]
pub struct SupportedCache {
    ttl: Duration,
    state: RwLock<Option<SupportedCacheState>>,
}

impl SupportedCache {
    /// Creates an empty cache with the given TTL.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::const_new(None),
        }
    }

    /// Returns the configured TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached response if it has not expired.
    pub async fn get(&self) -> Option<SupportedResponse> {
        let guard = self.state.read().await;
        let cache = guard.as_ref()?;
        if Instant::now() < cache.expires_at {
            Some(cache.response.clone())
        } else {
            None
        }
    }

    /// Stores a response for the configured TTL.
    pub async fn set(&self, response: SupportedResponse) {
        let mut guard = self.state.write().await;
        *guard = Some(SupportedCacheState {
            response,
            expires_at: Instant::now() + self.ttl,
        });
    }

    /// Drops the cached response.
    pub async fn clear(&self) {
        let mut guard = self.state.write().await;
        *guard = None;
    }
}

impl Clone for SupportedCache {
    fn clone(&self) -> Self {
        Self::new(self.ttl)
    }
}

/// Errors that can occur while talking to a remote facilitator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HttpFacilitatorError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl HttpFacilitatorError {
    /// Returns the endpoint or step the error occurred at.
    #[must_use]
    pub const fn context(&self) -> &'static str {
        match self {
            Self::UrlParse { context, .. }
            | Self::Http { context, .. }
            | Self::JsonDeserialization { context, .. }
            | Self::HttpStatus { context, .. }
            | Self::ResponseBodyRead { context, .. } => *context,
        }
    }
}

impl From<HttpFacilitatorError> for FacilitatorError {
    fn from(err: HttpFacilitatorError) -> Self {
        Self::with_source(err.context(), err)
    }
}

/// A client for a remote x402 facilitator.
#[derive(Clone, Debug)]
pub struct HttpFacilitatorClient {
    base_url: Url,
    verify_url: Url,
    settle_url: Url,
    supported_url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
    supported_cache: SupportedCache,
}

impl HttpFacilitatorClient {
    /// Default TTL for caching the `/supported` response (10 minutes).
    pub const DEFAULT_SUPPORTED_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL.
    #[must_use]
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL.
    #[must_use]
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the computed `./supported` URL.
    #[must_use]
    pub const fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Returns the custom headers sent with every request.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the `/supported` cache.
    #[must_use]
    pub const fn supported_cache(&self) -> &SupportedCache {
        &self.supported_cache
    }

    /// Constructs a client from a base URL.
    ///
    /// Endpoint URLs are resolved relative to the base, so the base should
    /// end with a slash. [`TryFrom<&str>`] normalizes this automatically.
    ///
    /// # Errors
    ///
    /// Returns [`HttpFacilitatorError::UrlParse`] if an endpoint URL cannot
    /// be constructed.
    pub fn try_new(base_url: Url) -> Result<Self, HttpFacilitatorError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| HttpFacilitatorError::UrlParse { context, source })
        };
        let verify_url = join("./verify", "Failed to construct ./verify URL")?;
        let settle_url = join("./settle", "Failed to construct ./settle URL")?;
        let supported_url = join("./supported", "Failed to construct ./supported URL")?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeout: None,
            supported_cache: SupportedCache::new(Self::DEFAULT_SUPPORTED_CACHE_TTL),
        })
    }

    /// Attaches custom headers (e.g. an API key) to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the TTL for caching the `/supported` response.
    ///
    /// Default is 10 minutes. Use [`Self::without_supported_cache()`] to
    /// query the facilitator on every call.
    #[must_use]
    pub fn with_supported_cache_ttl(mut self, ttl: Duration) -> Self {
        self.supported_cache = SupportedCache::new(ttl);
        self
    }

    /// Disables caching for the `/supported` endpoint.
    #[must_use]
    pub fn without_supported_cache(self) -> Self {
        self.with_supported_cache_ttl(Duration::ZERO)
    }

    /// Sends a `POST /verify` request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpFacilitatorError`] if the request fails.
    pub async fn verify_request(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<VerifyResponse, HttpFacilitatorError> {
        self.post_json(&self.verify_url, "POST /verify", request)
            .await
    }

    /// Sends a `POST /settle` request.
    ///
    /// # Errors
    ///
    /// Returns [`HttpFacilitatorError`] if the request fails.
    pub async fn settle_request(
        &self,
        request: &FacilitatorRequest,
    ) -> Result<SettleResponse, HttpFacilitatorError> {
        self.post_json(&self.settle_url, "POST /settle", request)
            .await
    }

    /// Sends a `GET /supported` request, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns [`HttpFacilitatorError`] if the request fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "m402.facilitator_client.supported", skip_all, err)
    )]
    pub async fn supported_uncached(&self) -> Result<SupportedResponse, HttpFacilitatorError> {
        self.get_json(&self.supported_url, "GET /supported").await
    }

    /// Returns the `/supported` response, from cache while it is fresh.
    ///
    /// # Errors
    ///
    /// Returns [`HttpFacilitatorError`] if the request fails.
    pub async fn supported_cached(&self) -> Result<SupportedResponse, HttpFacilitatorError> {
        if let Some(response) = self.supported_cache.get().await {
            return Ok(response);
        }

        #[cfg(feature = "telemetry")]
        tracing::debug!("m402.facilitator_client.supported_cache_miss");

        let response = self.supported_uncached().await?;
        self.supported_cache.set(response.clone()).await;
        Ok(response)
    }

    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
    ) -> Result<R, HttpFacilitatorError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.post(url.clone()).json(payload);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|source| HttpFacilitatorError::Http { context, source })?;
        let result = read_json(http_response, context).await;
        record_result_on_span(&result);
        result
    }

    async fn get_json<R>(&self, url: &Url, context: &'static str) -> Result<R, HttpFacilitatorError>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut req = self.client.get(url.clone());
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|source| HttpFacilitatorError::Http { context, source })?;
        let result = read_json(http_response, context).await;
        record_result_on_span(&result);
        result
    }
}

/// Decodes a 200 response as JSON; any other status becomes `HttpStatus`.
async fn read_json<R>(
    http_response: reqwest::Response,
    context: &'static str,
) -> Result<R, HttpFacilitatorError>
where
    R: serde::de::DeserializeOwned,
{
    if http_response.status() == StatusCode::OK {
        http_response
            .json::<R>()
            .await
            .map_err(|source| HttpFacilitatorError::JsonDeserialization { context, source })
    } else {
        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|source| HttpFacilitatorError::ResponseBodyRead { context, source })?;
        Err(HttpFacilitatorError::HttpStatus {
            context,
            status,
            body,
        })
    }
}

impl FacilitatorClient for HttpFacilitatorClient {
    fn verify<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, FacilitatorError>> {
        let fut = async move {
            let request = FacilitatorRequest::new(payload, requirements);
            Ok(self.verify_request(&request).await?)
        };
        #[cfg(feature = "telemetry")]
        let fut = with_span(
            fut,
            tracing::info_span!("m402.facilitator_client.verify", timeout = ?self.timeout),
        );
        Box::pin(fut)
    }

    fn settle<'a>(
        &'a self,
        payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, FacilitatorError>> {
        let fut = async move {
            let request = FacilitatorRequest::new(payload, requirements);
            Ok(self.settle_request(&request).await?)
        };
        #[cfg(feature = "telemetry")]
        let fut = with_span(
            fut,
            tracing::info_span!("m402.facilitator_client.settle", timeout = ?self.timeout),
        );
        Box::pin(fut)
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async move { Ok(self.supported_cached().await?) })
    }
}

/// Parses the base URL, normalizing it to exactly one trailing slash.
impl TryFrom<&str> for HttpFacilitatorClient {
    type Error = HttpFacilitatorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|source| HttpFacilitatorError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for HttpFacilitatorClient {
    type Error = HttpFacilitatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to facilitator failed");
        }
    }
}

#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

#[cfg(feature = "telemetry")]
fn with_span<F: Future>(fut: F, span: Span) -> impl Future<Output = F::Output> {
    fut.instrument(span)
}

#[cfg(test)]
mod tests {
    use m402::proto::SupportedPaymentKind;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn supported_response() -> SupportedResponse {
        SupportedResponse {
            kinds: vec![SupportedPaymentKind {
                x402_version: 1,
                scheme: "exact".to_owned(),
                network: "solana-devnet".to_owned(),
                extra: Some(serde_json::json!({
                    "feePayer": "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4"
                })),
            }],
        }
    }

    fn payload() -> PaymentPayload {
        PaymentPayload {
            x402_version: 1,
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            payload: serde_json::json!({"signature": "0xabc"}),
        }
    }

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "exact".to_owned(),
            network: "base-sepolia".to_owned(),
            max_amount_required: "10000".to_owned(),
            resource: "x402://echo".to_owned(),
            description: "Echo".to_owned(),
            mime_type: "application/json".to_owned(),
            output_schema: None,
            pay_to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C".to_owned(),
            max_timeout_seconds: 300,
            asset: "0x036CbD53842c5426634e7929541eC2318f3dCF7e".to_owned(),
            extra: None,
        }
    }

    fn client_for(server: &MockServer) -> HttpFacilitatorClient {
        HttpFacilitatorClient::try_from(server.uri()).unwrap()
    }

    #[test]
    fn test_base_url_normalization() {
        let client = HttpFacilitatorClient::try_from("https://facilitator.example/api//").unwrap();
        assert_eq!(client.base_url().as_str(), "https://facilitator.example/api/");
        assert_eq!(
            client.verify_url().as_str(),
            "https://facilitator.example/api/verify"
        );
        assert_eq!(
            client.supported_url().as_str(),
            "https://facilitator.example/api/supported"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpFacilitatorClient::try_from("not a url").unwrap_err();
        assert!(matches!(err, HttpFacilitatorError::UrlParse { .. }));
    }

    #[tokio::test]
    async fn test_verify_posts_request_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .and(body_partial_json(serde_json::json!({
                "x402Version": 1,
                "paymentPayload": {"network": "base-sepolia"},
                "paymentRequirements": {"maxAmountRequired": "10000"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"isValid": true, "payer": "0xpayer"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = FacilitatorClient::verify(&client, &payload(), &requirements())
            .await
            .unwrap();
        assert_eq!(response, VerifyResponse::valid(Some("0xpayer".to_owned())));
    }

    #[tokio::test]
    async fn test_settle_error_response_is_not_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": false,
                "errorReason": "insufficient_funds",
                "network": "base-sepolia"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let response = FacilitatorClient::settle(&client, &payload(), &requirements())
            .await
            .unwrap();
        let SettleResponse::Error { reason, .. } = response else {
            panic!("expected settlement error");
        };
        assert_eq!(reason, "insufficient_funds");
    }

    #[tokio::test]
    async fn test_non_ok_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .verify_request(&FacilitatorRequest::new(&payload(), &requirements()))
            .await
            .unwrap_err();
        let HttpFacilitatorError::HttpStatus { status, body, .. } = &err else {
            panic!("expected status error, got {err}");
        };
        assert_eq!(*status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, "bad gateway");

        let converted = FacilitatorError::from(err);
        assert_eq!(converted.context(), "POST /verify");
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_response()))
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", http::HeaderValue::from_static("secret"));
        let client = client_for(&server).with_headers(headers);
        let supported = client.supported_uncached().await.unwrap();
        assert_eq!(supported.kinds.len(), 1);
    }

    #[tokio::test]
    async fn test_supported_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_response()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let first = FacilitatorClient::supported(&client).await.unwrap();
        let second = FacilitatorClient::supported(&client).await.unwrap();
        assert_eq!(first.kinds[0].fee_payer(), second.kinds[0].fee_payer());
    }

    #[tokio::test]
    async fn test_supported_cache_expires() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_response()))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).with_supported_cache_ttl(Duration::from_millis(1));
        client.supported_cached().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.supported_cached().await.unwrap();
    }

    #[tokio::test]
    async fn test_supported_cache_disabled_and_cloned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(supported_response()))
            .expect(3)
            .mount(&server)
            .await;

        let uncached = client_for(&server).without_supported_cache();
        uncached.supported_cached().await.unwrap();
        uncached.supported_cached().await.unwrap();

        let cached = client_for(&server);
        cached.supported_cached().await.unwrap();
        let clone = cached.clone();
        assert!(clone.supported_cache().get().await.is_none());
        cached.supported_cache().clear().await;
        assert!(cached.supported_cache().get().await.is_none());
    }
}
