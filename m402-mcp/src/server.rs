//! Server-side MCP x402 payment gate.
//!
//! [`PaymentGate`] wraps a priced tool handler with verification and
//! settlement. [`X402Server`] composes the gate with any [`McpServer`] and
//! exposes [`paid_tool`](X402AugmentedServer::paid_tool).
//!
//! # Flow
//!
//! 1. Resolve the price into an atomic amount (`PRICE_COMPUTE_FAILED`)
//! 2. Build the requirements for the configured network
//! 3. Read the token from `_meta["x402/payment"]` or the `X-PAYMENT` header;
//!    without one, answer `PAYMENT_REQUIRED` with the requirements
//! 4. Decode the token (`INVALID_PAYMENT`) and verify it with the facilitator
//! 5. Execute the handler; a failure is returned as-is and never settled
//! 6. Settle once, then attach the receipt to `_meta["x402/payment-response"]`
//!    or answer `SETTLEMENT_FAILED`
//!
//! A settlement failure discards the handler's result even though the
//! handler already ran. Paid handlers must therefore be safe to run again
//! when the client retries.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use m402::encoding::decode_payment;
use m402::facilitator::{BoxError, BoxFuture, FacilitatorClient};
use m402::price::{PriceResolver, UsdcPriceResolver};
use m402::proto::{
    DEFAULT_X402_VERSION, PaymentPayload, PaymentReceipt, PaymentRequired, PaymentRequirements,
    SettleResponse, VerifyResponse, reason,
};
use m402::requirements::RequirementsBuilder;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value};

use crate::error::McpPaymentError;
use crate::extract::{attach_payment_receipt, extract_payment_token, payment_required_result};
use crate::types::{
    CallToolParams, CallToolResult, ListToolsResult, RequestContext, Tool, ToolAnnotations,
};

/// A registered tool handler.
///
/// Receives the call arguments and the request context. An `Err` is
/// reported to the caller as a failed execution.
pub type ToolHandler = Arc<
    dyn Fn(
            Map<String, Value>,
            RequestContext,
        ) -> BoxFuture<'static, Result<CallToolResult, BoxError>>
        + Send
        + Sync,
>;

/// Wraps an async closure into a [`ToolHandler`].
pub fn tool_handler<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(Map<String, Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult, BoxError>> + Send + 'static,
{
    Arc::new(move |arguments, ctx| Box::pin(f(arguments, ctx)))
}

/// Verifies, executes and settles paid tool calls.
///
/// A gate serves one network and recipient. It holds no per-call state, so
/// one instance can serve concurrent calls.
pub struct PaymentGate {
    facilitator: Arc<dyn FacilitatorClient>,
    price_resolver: Arc<dyn PriceResolver>,
    requirements: RequirementsBuilder,
    network: String,
    pay_to: String,
    x402_version: u32,
}

impl std::fmt::Debug for PaymentGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGate")
            .field("requirements", &self.requirements)
            .field("network", &self.network)
            .field("pay_to", &self.pay_to)
            .field("x402_version", &self.x402_version)
            .finish_non_exhaustive()
    }
}

impl PaymentGate {
    /// Creates a gate charging in USDC on `network`, paid to `pay_to`.
    #[must_use]
    pub fn new(
        facilitator: Arc<dyn FacilitatorClient>,
        network: impl Into<String>,
        pay_to: impl Into<String>,
    ) -> Self {
        Self {
            facilitator,
            price_resolver: Arc::new(UsdcPriceResolver::default()),
            requirements: RequirementsBuilder::default(),
            network: network.into(),
            pay_to: pay_to.into(),
            x402_version: DEFAULT_X402_VERSION,
        }
    }

    /// Replaces the price resolver.
    #[must_use]
    pub fn with_price_resolver(mut self, resolver: Arc<dyn PriceResolver>) -> Self {
        self.price_resolver = resolver;
        self
    }

    /// Replaces the requirements builder.
    #[must_use]
    pub fn with_requirements_builder(mut self, builder: RequirementsBuilder) -> Self {
        self.requirements = builder;
        self
    }

    /// Sets the protocol version (default 1).
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.x402_version = version;
        self
    }

    /// Returns the network this gate charges on.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Returns the protocol version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.x402_version
    }

    /// Processes one call of a paid tool.
    ///
    /// Every payment outcome is returned as a tool result; nothing is
    /// propagated to the transport.
    pub async fn process(
        &self,
        tool: &str,
        description: &str,
        price: Decimal,
        arguments: Map<String, Value>,
        ctx: RequestContext,
        handler: &ToolHandler,
    ) -> CallToolResult {
        let resolved = match self.price_resolver.resolve(price, &self.network) {
            Ok(resolved) => resolved,
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    tool,
                    network = %self.network,
                    error = %_e,
                    "price computation failed"
                );
                return self.reject(reason::PRICE_COMPUTE_FAILED);
            }
        };

        let requirements = match self
            .requirements
            .build(
                tool,
                description,
                &resolved,
                &self.network,
                &self.pay_to,
                self.facilitator.as_ref(),
            )
            .await
        {
            Ok(requirements) => requirements,
            Err(e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    tool,
                    network = %self.network,
                    error = %e,
                    "building requirements failed"
                );
                return self.reject(e.to_string());
            }
        };

        let Some(token) = extract_payment_token(&ctx) else {
            return self.payment_required(&requirements, reason::PAYMENT_REQUIRED, None);
        };

        let mut payload = match decode_payment(&token) {
            Ok(payload) => payload,
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(tool, error = %_e, "payment token did not decode");
                return self.payment_required(&requirements, reason::INVALID_PAYMENT, None);
            }
        };
        payload.x402_version = self.x402_version;

        if let Err(rejection) = self.verify(&payload, &requirements).await {
            return rejection;
        }

        let result = execute(handler, arguments, ctx).await;
        if result.is_error {
            #[cfg(feature = "telemetry")]
            tracing::info!(tool, "tool execution failed, payment not settled");
            return result;
        }

        self.settle(&payload, &requirements, result).await
    }

    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<(), CallToolResult> {
        match self.facilitator.verify(payload, requirements).await {
            Ok(VerifyResponse::Valid { .. }) => Ok(()),
            Ok(VerifyResponse::Invalid { reason, payer }) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(reason = %reason, payer = ?payer, "payment rejected by facilitator");
                Err(self.payment_required(requirements, reason, payer))
            }
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_e, "payment verification failed");
                Err(self.payment_required(requirements, reason::INVALID_PAYMENT, None))
            }
        }
    }

    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        mut result: CallToolResult,
    ) -> CallToolResult {
        match self.facilitator.settle(payload, requirements).await {
            Ok(response @ SettleResponse::Success { .. }) => {
                if let Some(receipt) = PaymentReceipt::from_settlement(&response) {
                    #[cfg(feature = "telemetry")]
                    tracing::info!(
                        tx = %receipt.transaction,
                        network = %receipt.network,
                        "payment settled"
                    );
                    if let Err(_e) = attach_payment_receipt(&mut result, &receipt) {
                        #[cfg(feature = "telemetry")]
                        tracing::error!(error = %_e, "failed to attach payment receipt");
                    }
                }
                result
            }
            Ok(SettleResponse::Error { reason, .. }) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(reason = %reason, "settlement failed after execution");
                self.payment_required(requirements, reason, None)
            }
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_e, "settlement request failed after execution");
                self.payment_required(requirements, reason::SETTLEMENT_FAILED, None)
            }
        }
    }

    fn reject(&self, error: impl Into<String>) -> CallToolResult {
        payment_required_result(&PaymentRequired::error(self.x402_version, error))
    }

    fn payment_required(
        &self,
        requirements: &PaymentRequirements,
        error: impl Into<String>,
        payer: Option<String>,
    ) -> CallToolResult {
        payment_required_result(&PaymentRequired {
            x402_version: self.x402_version,
            error: error.into(),
            accepts: Some(vec![requirements.clone()]),
            payer,
        })
    }
}

/// Runs a handler, turning errors and panics into a failed result.
async fn execute(
    handler: &ToolHandler,
    arguments: Map<String, Value>,
    ctx: RequestContext,
) -> CallToolResult {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(arguments, ctx))) {
        Ok(future) => future,
        Err(panic) => return execution_failed(&panic_message(panic.as_ref())),
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => execution_failed(&e.to_string()),
        Err(panic) => execution_failed(&panic_message(panic.as_ref())),
    }
}

fn execution_failed(message: &str) -> CallToolResult {
    CallToolResult::error(format!("Tool execution failed: {message}"))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}

/// The base tool registry of an MCP server.
///
/// Implement this trait to integrate with any MCP SDK.
pub trait McpServer: Send + Sync {
    /// Registers a tool.
    ///
    /// # Errors
    ///
    /// Returns [`McpPaymentError::DuplicateTool`] if the name is taken.
    fn tool(&mut self, tool: Tool, handler: ToolHandler) -> Result<(), McpPaymentError>;

    /// Lists the registered tools.
    fn list_tools(&self) -> ListToolsResult;

    /// Dispatches a call to the named tool.
    fn call_tool(
        &self,
        params: CallToolParams,
        ctx: RequestContext,
    ) -> BoxFuture<'_, CallToolResult>;
}

/// An in-memory [`McpServer`].
#[derive(Default)]
pub struct ToolRouter {
    tools: Vec<(Tool, ToolHandler)>,
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|(tool, _)| &tool.name).collect();
        f.debug_struct("ToolRouter").field("tools", &names).finish()
    }
}

impl ToolRouter {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl McpServer for ToolRouter {
    fn tool(&mut self, tool: Tool, handler: ToolHandler) -> Result<(), McpPaymentError> {
        if self.tools.iter().any(|(t, _)| t.name == tool.name) {
            return Err(McpPaymentError::DuplicateTool(tool.name));
        }
        self.tools.push((tool, handler));
        Ok(())
    }

    fn list_tools(&self) -> ListToolsResult {
        ListToolsResult {
            tools: self.tools.iter().map(|(tool, _)| tool.clone()).collect(),
            next_cursor: None,
        }
    }

    fn call_tool(
        &self,
        params: CallToolParams,
        mut ctx: RequestContext,
    ) -> BoxFuture<'_, CallToolResult> {
        Box::pin(async move {
            let Some((_, handler)) = self.tools.iter().find(|(t, _)| t.name == params.name)
            else {
                return CallToolResult::error(format!("Unknown tool: {}", params.name));
            };
            if ctx.meta.is_none() {
                ctx.meta = params.meta;
            }
            execute(handler, params.arguments, ctx).await
        })
    }
}

/// An [`McpServer`] that can also register paid tools.
pub trait X402AugmentedServer: McpServer {
    /// Registers a tool whose every call must be paid for.
    ///
    /// The tool is advertised with `paymentHint: true` and
    /// `paymentPriceUSD: price` merged into `annotations`.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying registration.
    fn paid_tool(
        &mut self,
        name: &str,
        description: &str,
        price: Decimal,
        input_schema: Value,
        annotations: ToolAnnotations,
        handler: ToolHandler,
    ) -> Result<(), McpPaymentError>;
}

/// Composes a base server with a [`PaymentGate`].
///
/// Free tools registered through [`McpServer::tool`] pass straight through.
#[derive(Debug)]
pub struct X402Server<S> {
    inner: S,
    gate: Arc<PaymentGate>,
}

impl<S: McpServer> X402Server<S> {
    /// Wraps `inner`, charging paid tools through `gate`.
    #[must_use]
    pub fn new(inner: S, gate: PaymentGate) -> Self {
        Self {
            inner,
            gate: Arc::new(gate),
        }
    }

    /// Returns the payment gate.
    #[must_use]
    pub fn gate(&self) -> &PaymentGate {
        &self.gate
    }

    /// Returns the wrapped server.
    #[must_use]
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: McpServer> McpServer for X402Server<S> {
    fn tool(&mut self, tool: Tool, handler: ToolHandler) -> Result<(), McpPaymentError> {
        self.inner.tool(tool, handler)
    }

    fn list_tools(&self) -> ListToolsResult {
        self.inner.list_tools()
    }

    fn call_tool(
        &self,
        params: CallToolParams,
        ctx: RequestContext,
    ) -> BoxFuture<'_, CallToolResult> {
        self.inner.call_tool(params, ctx)
    }
}

impl<S: McpServer> X402AugmentedServer for X402Server<S> {
    fn paid_tool(
        &mut self,
        name: &str,
        description: &str,
        price: Decimal,
        input_schema: Value,
        mut annotations: ToolAnnotations,
        handler: ToolHandler,
    ) -> Result<(), McpPaymentError> {
        annotations.payment_hint = Some(true);
        annotations.payment_price_usd = price.to_f64();
        let tool = Tool::new(name, description)
            .with_input_schema(input_schema)
            .with_annotations(annotations);

        let gate = Arc::clone(&self.gate);
        let name = Arc::<str>::from(name);
        let description = Arc::<str>::from(description);
        let gated: ToolHandler = Arc::new(move |arguments, ctx| {
            let gate = Arc::clone(&gate);
            let handler = Arc::clone(&handler);
            let name = Arc::clone(&name);
            let description = Arc::clone(&description);
            Box::pin(async move {
                Ok(gate
                    .process(&name, &description, price, arguments, ctx, &handler)
                    .await)
            })
        });
        self.inner.tool(tool, gated)
    }
}
