//! A paid tool and a paying client wired together in one process.
//!
//! The facilitator is a stub that accepts every payment, so nothing touches
//! a chain. Useful to watch the handshake in the logs:
//!
//! ```bash
//! RUST_LOG=debug cargo run -p m402-mcp --example loopback --features telemetry
//! ```

use std::sync::Arc;

use m402::encoding::encode_payment;
use m402::facilitator::{BoxError, BoxFuture, FacilitatorClient, FacilitatorError};
use m402::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse, VerifyResponse,
};
use m402_mcp::client::{
    CredentialBuilder, McpClient, SignerCapability, X402AugmentedClient, X402Client,
    X402ClientConfig, confirm_with,
};
use m402_mcp::error::McpPaymentError;
use m402_mcp::extract::extract_payment_receipt;
use m402_mcp::server::{
    McpServer, PaymentGate, ToolRouter, X402AugmentedServer, X402Server, tool_handler,
};
use m402_mcp::types::{
    CallToolParams, CallToolResult, ListToolsResult, RequestContext, ToolAnnotations,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

/// Accepts every payment and settles it with a fake transaction.
struct AcceptAll;

impl FacilitatorClient for AcceptAll {
    fn verify<'a>(
        &'a self,
        _payload: &'a PaymentPayload,
        _requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<VerifyResponse, FacilitatorError>> {
        Box::pin(async { Ok(VerifyResponse::valid(Some("0xdemo-payer".to_owned()))) })
    }

    fn settle<'a>(
        &'a self,
        _payload: &'a PaymentPayload,
        requirements: &'a PaymentRequirements,
    ) -> BoxFuture<'a, Result<SettleResponse, FacilitatorError>> {
        Box::pin(async move {
            Ok(SettleResponse::Success {
                payer: Some("0xdemo-payer".to_owned()),
                transaction: "0xdemo-transaction".to_owned(),
                network: requirements.network.clone(),
            })
        })
    }

    fn supported(&self) -> BoxFuture<'_, Result<SupportedResponse, FacilitatorError>> {
        Box::pin(async { Ok(SupportedResponse::default()) })
    }
}

/// Signs nothing; wraps the requirements in an unsigned payload.
struct UnsignedCredentials;

impl CredentialBuilder<()> for UnsignedCredentials {
    fn build<'a>(
        &'a self,
        _signer: &'a (),
        x402_version: u32,
        requirements: &'a PaymentRequirements,
        _config: Option<&'a Value>,
    ) -> BoxFuture<'a, Result<String, BoxError>> {
        Box::pin(async move {
            let payload = PaymentPayload {
                x402_version,
                scheme: requirements.scheme.clone(),
                network: requirements.network.clone(),
                payload: json!({ "payTo": requirements.pay_to }),
            };
            Ok(encode_payment(&payload)?)
        })
    }
}

/// Carries calls straight into an in-process server.
struct Loopback<S>(S);

impl<S: McpServer> McpClient for Loopback<S> {
    fn call_tool(
        &self,
        params: CallToolParams,
    ) -> BoxFuture<'_, Result<CallToolResult, McpPaymentError>> {
        Box::pin(async move {
            let ctx = RequestContext::from_params(&params);
            Ok(self.0.call_tool(params, ctx).await)
        })
    }

    fn list_tools(&self) -> BoxFuture<'_, Result<ListToolsResult, McpPaymentError>> {
        Box::pin(async move { Ok(self.0.list_tools()) })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Loopback failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let gate = PaymentGate::new(Arc::new(AcceptAll), "base-sepolia", PAY_TO);
    let mut server = X402Server::new(ToolRouter::new(), gate);
    server.paid_tool(
        "get_weather",
        "Current weather for a city",
        Decimal::new(5, 2),
        json!({
            "type": "object",
            "properties": { "city": { "type": "string" } },
            "required": ["city"]
        }),
        ToolAnnotations::default(),
        tool_handler(|arguments, _ctx| async move {
            let city = arguments
                .get("city")
                .and_then(Value::as_str)
                .unwrap_or("nowhere");
            Ok(CallToolResult::text(format!("It is sunny in {city}")))
        }),
    )?;

    let config = X402ClientConfig::default().with_confirmation(confirm_with(|accepts| async move {
        tracing::info!(options = accepts.len(), "approving payment");
        true
    }));
    let client = X402Client::new(
        Loopback(server),
        (),
        &|_: &()| SignerCapability::SingleChain(m402::networks::BASE_SEPOLIA),
        UnsignedCredentials,
        config,
    )?;

    for tool in client.list_tools().await?.tools {
        tracing::info!(name = %tool.name, description = ?tool.description, "tool");
    }

    let mut arguments = Map::new();
    arguments.insert("city".to_owned(), json!("Lisbon"));
    let result = client
        .call_tool_with_payment(None, CallToolParams::new("get_weather", arguments))
        .await?;

    tracing::info!(text = ?result.first_text(), is_error = result.is_error, "tool result");
    if let Some(receipt) = extract_payment_receipt(&result) {
        tracing::info!(tx = %receipt.transaction, network = %receipt.network, "payment settled");
    }
    Ok(())
}
