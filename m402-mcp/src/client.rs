//! Client-side MCP x402 payment handling.
//!
//! [`X402Client`] wraps any [`McpClient`] by composition. When a call comes
//! back with a payment-required error, the client:
//!
//! 1. Asks the confirmation callback, passing every advertised requirement
//! 2. Keeps the requirements the signer can pay on
//! 3. Selects the first `exact` requirement among them
//! 4. Checks the amount against the spend cap
//! 5. Builds a credential through the injected [`CredentialBuilder`]
//! 6. Retries the call once with the credential in `_meta["x402/payment"]`
//!
//! The retry's result is returned verbatim, even if it asks for payment
//! again. A logical call therefore costs at most two transport calls.

use std::future::Future;
use std::sync::Arc;

use alloy_primitives::U256;
use m402::facilitator::{BoxError, BoxFuture};
use m402::networks::NetworkFamily;
use m402::proto::{DEFAULT_X402_VERSION, ExactScheme, PaymentRequirements};
use m402::requirements::RequirementsBuilder;
use serde_json::Value;

use crate::error::{ClientPaymentError, McpPaymentError};
use crate::extract::{attach_payment_token, extract_payment_required};
use crate::types::{CallToolParams, CallToolResult, ListToolsResult, Tool};

/// Default spend cap in atomic units: 0.10 USDC.
pub const DEFAULT_MAX_PAYMENT_VALUE: u64 = 100_000;

/// Trait abstracting MCP tool call capability.
///
/// Implement this trait to integrate with any MCP SDK. The implementation
/// should forward to the underlying MCP session.
///
/// # Examples
///
/// ```rust,ignore
/// struct MyMcpSession { /* ... */ }
///
/// impl McpClient for MyMcpSession {
///     fn call_tool(
///         &self,
///         params: CallToolParams,
///     ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
///         Box::pin(async move {
///             self.session
///                 .call_tool(params)
///                 .await
///                 .map_err(McpPaymentError::transport)
///         })
///     }
///
///     fn list_tools(&self) -> BoxFuture<'_, Result<ListToolsResult, McpPaymentError>> {
///         Box::pin(async move {
///             self.session
///                 .list_tools()
///                 .await
///                 .map_err(McpPaymentError::transport)
///         })
///     }
/// }
/// ```
pub trait McpClient: Send + Sync {
    /// Calls an MCP tool with the given parameters.
    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>>;

    /// Lists the tools of the server.
    fn list_tools(&self) -> BoxFuture<'_, Result<ListToolsResult, McpPaymentError>>;
}

/// What a wallet signer can pay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerCapability {
    /// Bound to one EVM chain, identified by chain id.
    SingleChain(u64),
    /// Able to sign for any network.
    MultiNetwork,
    /// Bound to every known network of one family.
    Family(NetworkFamily),
}

/// Introspects a signer of type `W`.
///
/// Implemented for any `Fn(&W) -> SignerCapability`.
pub trait SignerCapabilities<W>: Send + Sync {
    /// Returns the capability of `signer`.
    fn capability(&self, signer: &W) -> SignerCapability;
}

impl<W, F> SignerCapabilities<W> for F
where
    F: Fn(&W) -> SignerCapability + Send + Sync,
{
    fn capability(&self, signer: &W) -> SignerCapability {
        self(signer)
    }
}

/// Builds a signed payment token for a requirement.
///
/// The scheme-specific signing lives behind this trait; the client only
/// transports the token it returns.
pub trait CredentialBuilder<W>: Send + Sync {
    /// Signs a payment satisfying `requirements` and encodes it as a token.
    fn build<'a>(
        &'a self,
        signer: &'a W,
        x402_version: u32,
        requirements: &'a PaymentRequirements,
        config: Option<&'a Value>,
    ) -> BoxFuture<'a, Result<String, BoxError>>;
}

/// Approves or declines a payment, given every advertised requirement.
///
/// This is where a client asks a human or a policy. Returning `false`
/// cancels the call.
pub type ConfirmationCallback =
    Arc<dyn Fn(Vec<PaymentRequirements>) -> BoxFuture<'static, bool> + Send + Sync>;

/// Wraps an async closure into a [`ConfirmationCallback`].
pub fn confirm_with<F, Fut>(f: F) -> ConfirmationCallback
where
    F: Fn(Vec<PaymentRequirements>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Arc::new(move |accepts| Box::pin(f(accepts)))
}

/// Configuration of an [`X402Client`].
#[derive(Clone)]
pub struct X402ClientConfig {
    /// Spend cap per call, in atomic units.
    pub max_payment_value: U256,
    /// Protocol version passed to the credential builder.
    pub x402_version: u32,
    /// Default confirmation, used when a call supplies none.
    pub confirmation: Option<ConfirmationCallback>,
    /// Scheme-specific configuration passed to the credential builder.
    pub scheme_config: Option<Value>,
}

impl std::fmt::Debug for X402ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402ClientConfig")
            .field("max_payment_value", &self.max_payment_value)
            .field("x402_version", &self.x402_version)
            .field("confirmation", &self.confirmation.is_some())
            .field("scheme_config", &self.scheme_config)
            .finish()
    }
}

impl Default for X402ClientConfig {
    /// Cap of 0.10 USDC, version 1 and no confirmation, which declines
    /// every payment until one is configured.
    fn default() -> Self {
        Self {
            max_payment_value: U256::from(DEFAULT_MAX_PAYMENT_VALUE),
            x402_version: DEFAULT_X402_VERSION,
            confirmation: None,
            scheme_config: None,
        }
    }
}

impl X402ClientConfig {
    /// Sets the spend cap in atomic units.
    #[must_use]
    pub const fn with_max_payment_value(mut self, value: U256) -> Self {
        self.max_payment_value = value;
        self
    }

    /// Sets the protocol version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.x402_version = version;
        self
    }

    /// Sets the default confirmation callback.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: ConfirmationCallback) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// Sets the scheme-specific configuration.
    #[must_use]
    pub fn with_scheme_config(mut self, config: Value) -> Self {
        self.scheme_config = Some(config);
        self
    }
}

/// Networks a signer can pay on.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CompatibleNetworks {
    Any,
    Only(Vec<String>),
}

impl CompatibleNetworks {
    fn contains(&self, network: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(networks) => networks.iter().any(|n| n == network),
        }
    }
}

/// An [`McpClient`] that can also pay for tool calls.
pub trait X402AugmentedClient: McpClient {
    /// Calls a tool, paying for it once if the server asks.
    ///
    /// `confirm` overrides the configured confirmation for this call.
    /// Declined, incompatible and over-cap payments are returned as error
    /// results without a second call.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError`] on transport failures and when the
    /// credential cannot be built.
    fn call_tool_with_payment(
        &self,
        confirm: Option<ConfirmationCallback>,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>>;
}

/// Composes a base client with a wallet signer.
pub struct X402Client<C, W> {
    inner: C,
    signer: W,
    networks: CompatibleNetworks,
    credentials: Box<dyn CredentialBuilder<W>>,
    config: X402ClientConfig,
}

impl<C, W> std::fmt::Debug for X402Client<C, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X402Client")
            .field("networks", &self.networks)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C, W> X402Client<C, W>
where
    C: McpClient,
    W: Send + Sync,
{
    /// Wraps `inner`, paying with `signer` over the known networks.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError::UnsupportedSigner`] if the signer is bound
    /// to an unknown chain.
    pub fn new<S, B>(
        inner: C,
        signer: W,
        capabilities: &S,
        credentials: B,
        config: X402ClientConfig,
    ) -> Result<Self, McpPaymentError>
    where
        S: SignerCapabilities<W> + ?Sized,
        B: CredentialBuilder<W> + 'static,
    {
        Self::with_strategies(
            inner,
            signer,
            capabilities,
            credentials,
            config,
            &RequirementsBuilder::default(),
        )
    }

    /// Like [`new`](Self::new), resolving networks through `strategies`.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError::UnsupportedSigner`] if the signer is bound
    /// to a chain missing from the strategies' registry.
    pub fn with_strategies<S, B>(
        inner: C,
        signer: W,
        capabilities: &S,
        credentials: B,
        config: X402ClientConfig,
        strategies: &RequirementsBuilder,
    ) -> Result<Self, McpPaymentError>
    where
        S: SignerCapabilities<W> + ?Sized,
        B: CredentialBuilder<W> + 'static,
    {
        let networks = match capabilities.capability(&signer) {
            SignerCapability::MultiNetwork => CompatibleNetworks::Any,
            SignerCapability::SingleChain(chain_id) => {
                let network = strategies
                    .registry()
                    .by_chain_id(chain_id)
                    .ok_or(McpPaymentError::UnsupportedSigner(chain_id))?;
                CompatibleNetworks::Only(vec![network.name.clone()])
            }
            SignerCapability::Family(family) => {
                CompatibleNetworks::Only(strategies.signer_networks(family))
            }
        };
        Ok(Self {
            inner,
            signer,
            networks,
            credentials: Box::new(credentials),
            config,
        })
    }

    /// Returns the wrapped client.
    #[must_use]
    pub const fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &X402ClientConfig {
        &self.config
    }

    fn select<'a>(&self, accepts: &'a [PaymentRequirements]) -> Option<&'a PaymentRequirements> {
        accepts
            .iter()
            .find(|r| ExactScheme == r.scheme && self.networks.contains(&r.network))
    }

    fn check_cap(&self, requirements: &PaymentRequirements) -> Result<(), ClientPaymentError> {
        let exceeded = |required: String| ClientPaymentError::CapExceeded {
            required,
            cap: self.config.max_payment_value.to_string(),
        };
        match parse_atomic(&requirements.max_amount_required) {
            Some(amount) if amount <= self.config.max_payment_value => Ok(()),
            Some(amount) => Err(exceeded(amount.to_string())),
            None => Err(exceeded(requirements.max_amount_required.clone())),
        }
    }

    async fn pay_and_retry(
        &self,
        confirm: Option<ConfirmationCallback>,
        params: CallToolParams,
    ) -> Result<CallToolResult, McpPaymentError> {
        let first = self.inner.call_tool(params.clone()).await?;
        let Some(required) = extract_payment_required(&first) else {
            return Ok(first);
        };
        let accepts = required.accepts.unwrap_or_default();

        #[cfg(feature = "telemetry")]
        tracing::debug!(tool = %params.name, options = accepts.len(), "payment required");

        let approved = match confirm.or_else(|| self.config.confirmation.clone()) {
            Some(confirmation) => confirmation(accepts.clone()).await,
            None => false,
        };
        if !approved {
            return Ok(ClientPaymentError::Declined.to_result());
        }

        let Some(selected) = self.select(&accepts) else {
            return Ok(ClientPaymentError::NoCompatibleRequirements.to_result());
        };
        if let Err(outcome) = self.check_cap(selected) {
            #[cfg(feature = "telemetry")]
            tracing::info!(tool = %params.name, error = %outcome, "payment refused");
            return Ok(outcome.to_result());
        }

        let token = self
            .credentials
            .build(
                &self.signer,
                self.config.x402_version,
                selected,
                self.config.scheme_config.as_ref(),
            )
            .await
            .map_err(McpPaymentError::CredentialCreation)?;

        #[cfg(feature = "telemetry")]
        tracing::info!(
            tool = %params.name,
            network = %selected.network,
            amount = %selected.max_amount_required,
            "retrying with payment"
        );

        let mut retry = params;
        attach_payment_token(&mut retry, token);
        self.inner.call_tool(retry).await
    }
}

impl<C, W> McpClient for X402Client<C, W>
where
    C: McpClient,
    W: Send + Sync,
{
    /// Calls a tool, paying through the configured confirmation.
    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
        Box::pin(self.pay_and_retry(None, params))
    }

    /// Lists tools with a price note appended to paid tool descriptions.
    fn list_tools(&self) -> BoxFuture<'_, Result<ListToolsResult, McpPaymentError>> {
        Box::pin(async move { self.inner.list_tools().await.map(decorate_paid_tools) })
    }
}

impl<C, W> X402AugmentedClient for X402Client<C, W>
where
    C: McpClient,
    W: Send + Sync,
{
    fn call_tool_with_payment(
        &self,
        confirm: Option<ConfirmationCallback>,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
        Box::pin(self.pay_and_retry(confirm, params))
    }
}

/// Appends a price note to the description of every paid tool.
#[must_use]
pub fn decorate_paid_tools(mut result: ListToolsResult) -> ListToolsResult {
    result.tools.iter_mut().for_each(decorate_paid_tool);
    result
}

fn decorate_paid_tool(tool: &mut Tool) {
    let Some(annotations) = tool.annotations.as_ref().filter(|a| a.is_paid()) else {
        return;
    };
    let cost = match annotations.payment_price_usd {
        Some(price) if price > 0.0 => format!("${price}"),
        _ => "an unknown amount".to_owned(),
    };
    let note = format!("(This is a paid tool, you will be charged {cost} for its execution)");
    tool.description = Some(match tool.description.take() {
        Some(description) => format!("{description} {note}"),
        None => note,
    });
}

/// Parses a decimal atomic amount; anything but ASCII digits is rejected.
fn parse_atomic(value: &str) -> Option<U256> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    U256::from_str_radix(value, 10).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use m402::proto::{PaymentRequired, reason};
    use serde_json::{Map, json};

    use super::*;
    use crate::PAYMENT_META_KEY;
    use crate::extract::payment_required_result;
    use crate::types::ToolAnnotations;

    struct Wallet;

    /// Replays scripted results and records every call it receives.
    #[derive(Default)]
    struct ScriptedSession {
        results: Mutex<VecDeque<CallToolResult>>,
        calls: Mutex<Vec<CallToolParams>>,
        tools: Vec<Tool>,
    }

    impl ScriptedSession {
        fn new(results: impl IntoIterator<Item = CallToolResult>) -> Self {
            Self {
                results: Mutex::new(results.into_iter().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<CallToolParams> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl McpClient for Arc<ScriptedSession> {
        fn call_tool(
            &self,
            params: CallToolParams,
        ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
            self.calls.lock().unwrap().push(params);
            let next = self.results.lock().unwrap().pop_front();
            Box::pin(async move {
                next.ok_or_else(|| McpPaymentError::transport("script exhausted"))
            })
        }

        fn list_tools(&self) -> BoxFuture<'_, Result<ListToolsResult, McpPaymentError>> {
            let tools = self.tools.clone();
            Box::pin(async move {
                Ok(ListToolsResult {
                    tools,
                    next_cursor: None,
                })
            })
        }
    }

    #[derive(Default)]
    struct CountingBuilder {
        calls: AtomicUsize,
    }

    impl CredentialBuilder<Wallet> for Arc<CountingBuilder> {
        fn build<'a>(
            &'a self,
            _signer: &'a Wallet,
            x402_version: u32,
            requirements: &'a PaymentRequirements,
            _config: Option<&'a Value>,
        ) -> BoxFuture<'a, Result<String, BoxError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let token = format!("v{x402_version}:{}", requirements.network);
            Box::pin(async move { Ok(token) })
        }
    }

    struct FailingBuilder;

    impl CredentialBuilder<Wallet> for FailingBuilder {
        fn build<'a>(
            &'a self,
            _signer: &'a Wallet,
            _x402_version: u32,
            _requirements: &'a PaymentRequirements,
            _config: Option<&'a Value>,
        ) -> BoxFuture<'a, Result<String, BoxError>> {
            Box::pin(async { Err::<String, BoxError>("wallet locked".into()) })
        }
    }

    fn requirements(network: &str, amount: &str) -> PaymentRequirements {
        serde_json::from_value(json!({
            "scheme": "exact",
            "network": network,
            "maxAmountRequired": amount,
            "resource": "x402://get_weather",
            "description": "Weather lookup",
            "mimeType": "application/json",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "maxTimeoutSeconds": 300,
            "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
        }))
        .unwrap()
    }

    fn payment_required(accepts: Vec<PaymentRequirements>) -> CallToolResult {
        payment_required_result(&PaymentRequired {
            accepts: Some(accepts),
            ..PaymentRequired::error(1, reason::PAYMENT_REQUIRED)
        })
    }

    fn approve() -> ConfirmationCallback {
        confirm_with(|_accepts| async { true })
    }

    fn params() -> CallToolParams {
        CallToolParams::new("get_weather", Map::from_iter([("city".to_owned(), json!("Oslo"))]))
    }

    fn client(
        session: &Arc<ScriptedSession>,
        capability: SignerCapability,
        builder: &Arc<CountingBuilder>,
        config: X402ClientConfig,
    ) -> X402Client<Arc<ScriptedSession>, Wallet> {
        X402Client::new(
            Arc::clone(session),
            Wallet,
            &move |_: &Wallet| capability,
            Arc::clone(builder),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_free_result_passes_through() {
        let session = Arc::new(ScriptedSession::new([CallToolResult::text("sunny")]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(result.first_text(), Some("sunny"));
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_pays_and_retries_once() {
        let session = Arc::new(ScriptedSession::new([
            payment_required(vec![requirements("base-sepolia", "50000")]),
            CallToolResult::text("sunny"),
        ]));
        let builder = Arc::new(CountingBuilder::default());
        let config = X402ClientConfig::default().with_max_payment_value(U256::from(1_000_000));
        let client = client(&session, SignerCapability::MultiNetwork, &builder, config);

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(result.first_text(), Some("sunny"));
        let calls = session.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].meta.is_none());
        assert_eq!(calls[1].arguments, params().arguments);
        assert_eq!(calls[1].meta.as_ref().unwrap()[PAYMENT_META_KEY], "v1:base-sepolia");
    }

    #[tokio::test]
    async fn test_second_payment_required_is_returned_verbatim() {
        let again = payment_required(vec![requirements("base-sepolia", "50000")]);
        let session = Arc::new(ScriptedSession::new([
            payment_required(vec![requirements("base-sepolia", "50000")]),
            again.clone(),
            CallToolResult::text("never reached"),
        ]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(result, again);
        assert_eq!(session.calls().len(), 2);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_declined_payment_makes_no_second_call() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "50000",
        )])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );
        let seen = Arc::new(AtomicUsize::new(0));
        let decline = {
            let seen = Arc::clone(&seen);
            confirm_with(move |accepts| {
                seen.store(accepts.len(), Ordering::SeqCst);
                async { false }
            })
        };

        let result = client.call_tool_with_payment(Some(decline), params()).await.unwrap();

        assert_eq!(ClientPaymentError::from_result(&result), Some(ClientPaymentError::Declined));
        assert_eq!(result.first_text(), Some("User declined payment"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(session.calls().len(), 1);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_confirmation_declines() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "50000",
        )])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool(params()).await.unwrap();

        assert_eq!(ClientPaymentError::from_result(&result), Some(ClientPaymentError::Declined));
        assert_eq!(session.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_configured_confirmation_is_the_default() {
        let session = Arc::new(ScriptedSession::new([
            payment_required(vec![requirements("base-sepolia", "50000")]),
            CallToolResult::text("sunny"),
        ]));
        let builder = Arc::new(CountingBuilder::default());
        let config = X402ClientConfig::default().with_confirmation(approve());
        let client = client(&session, SignerCapability::MultiNetwork, &builder, config);

        let result = client.call_tool(params()).await.unwrap();

        assert_eq!(result.first_text(), Some("sunny"));
    }

    #[tokio::test]
    async fn test_single_chain_signer_selects_its_network() {
        let session = Arc::new(ScriptedSession::new([
            payment_required(vec![
                requirements("base", "50000"),
                requirements("base-sepolia", "60000"),
            ]),
            CallToolResult::text("sunny"),
        ]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::SingleChain(84532),
            &builder,
            X402ClientConfig::default(),
        );

        client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        let calls = session.calls();
        assert_eq!(calls[1].meta.as_ref().unwrap()[PAYMENT_META_KEY], "v1:base-sepolia");
    }

    #[tokio::test]
    async fn test_solana_signer_has_no_compatible_evm_requirement() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "50000",
        )])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::Family(NetworkFamily::Solana),
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(
            result.first_text(),
            Some("No compatible payment requirements found for this wallet")
        );
        assert_eq!(session.calls().len(), 1);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_exact_scheme_is_skipped() {
        let mut upto = requirements("base-sepolia", "50000");
        upto.scheme = "upto".to_owned();
        let session = Arc::new(ScriptedSession::new([payment_required(vec![upto])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(
            ClientPaymentError::from_result(&result),
            Some(ClientPaymentError::NoCompatibleRequirements)
        );
    }

    #[tokio::test]
    async fn test_cap_is_enforced_before_signing() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "2000000",
        )])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(result.first_text(), Some("Payment exceeds client cap: 2000000 > 100000"));
        assert_eq!(session.calls().len(), 1);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_amount_exceeds_cap() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "0.05",
        )])]));
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let result = client.call_tool_with_payment(Some(approve()), params()).await.unwrap();

        assert_eq!(
            ClientPaymentError::from_result(&result),
            Some(ClientPaymentError::CapExceeded {
                required: "0.05".to_owned(),
                cap: "100000".to_owned(),
            })
        );
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_credential_failure_propagates() {
        let session = Arc::new(ScriptedSession::new([payment_required(vec![requirements(
            "base-sepolia",
            "50000",
        )])]));
        let client = X402Client::new(
            Arc::clone(&session),
            Wallet,
            &|_: &Wallet| SignerCapability::MultiNetwork,
            FailingBuilder,
            X402ClientConfig::default(),
        )
        .unwrap();

        let err = client
            .call_tool_with_payment(Some(approve()), params())
            .await
            .unwrap_err();

        assert!(matches!(err, McpPaymentError::CredentialCreation(_)));
        assert_eq!(session.calls().len(), 1);
    }

    #[test]
    fn test_unknown_chain_is_rejected_up_front() {
        let result = X402Client::new(
            Arc::new(ScriptedSession::default()),
            Wallet,
            &|_: &Wallet| SignerCapability::SingleChain(999_999),
            FailingBuilder,
            X402ClientConfig::default(),
        );
        assert!(matches!(result, Err(McpPaymentError::UnsupportedSigner(999_999))));
    }

    #[tokio::test]
    async fn test_list_tools_decorates_paid_tools() {
        let paid = |price: Option<f64>| ToolAnnotations {
            payment_hint: Some(true),
            payment_price_usd: price,
            ..Default::default()
        };
        let session = Arc::new(ScriptedSession {
            tools: vec![
                Tool::new("get_weather", "Weather lookup").with_annotations(paid(Some(0.05))),
                Tool::new("mystery", "Mystery box").with_annotations(paid(None)),
                Tool::new("ping", "Free ping"),
            ],
            ..Default::default()
        });
        let builder = Arc::new(CountingBuilder::default());
        let client = client(
            &session,
            SignerCapability::MultiNetwork,
            &builder,
            X402ClientConfig::default(),
        );

        let tools = client.list_tools().await.unwrap().tools;

        assert_eq!(
            tools[0].description.as_deref(),
            Some("Weather lookup (This is a paid tool, you will be charged $0.05 for its execution)")
        );
        assert_eq!(
            tools[1].description.as_deref(),
            Some("Mystery box (This is a paid tool, you will be charged an unknown amount for its execution)")
        );
        assert_eq!(tools[2].description.as_deref(), Some("Free ping"));
    }

    #[test]
    fn test_parse_atomic() {
        assert_eq!(parse_atomic("50000"), Some(U256::from(50_000)));
        assert_eq!(parse_atomic(""), None);
        assert_eq!(parse_atomic("1_000"), None);
        assert_eq!(parse_atomic("-5"), None);
        assert_eq!(parse_atomic("0x10"), None);
    }
}
