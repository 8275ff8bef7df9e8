//! Per-family strategies for shaping payment requirements.
//!
//! Each [`NetworkFamily`] is served by one [`FamilyStrategy`]. A strategy
//! knows how to canonicalize addresses, what goes into the `extra` field of
//! the requirements, and which networks a signer bound to the family can pay
//! on. New families plug in by registering another strategy with the
//! [`RequirementsBuilder`](crate::requirements::RequirementsBuilder); the
//! gate's control flow stays untouched.

use std::str::FromStr;

use alloy_primitives::Address;
use solana_pubkey::Pubkey;

use crate::facilitator::{BoxFuture, FacilitatorClient};
use crate::networks::{NetworkFamily, NetworkInfo, NetworkRegistry};
use crate::price::ResolvedPrice;
use crate::proto::{ExactScheme, PaymentRequirements};
use crate::requirements::RequirementsError;

/// Maximum validity window of a payment, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// MIME type advertised for tool results.
pub const TOOL_MIME_TYPE: &str = "application/json";

/// Everything a strategy needs to build requirements for one call.
#[derive(Debug, Clone, Copy)]
pub struct RequirementsContext<'a> {
    /// Name of the priced tool.
    pub tool: &'a str,
    /// Human-readable description of the tool.
    pub description: &'a str,
    /// The target network.
    pub network: &'a NetworkInfo,
    /// Recipient address as configured.
    pub pay_to: &'a str,
    /// Resolved atomic price and asset.
    pub price: &'a ResolvedPrice,
    /// Validity window of the payment.
    pub max_timeout_seconds: u64,
}

impl RequirementsContext<'_> {
    /// Returns the resource identifier of the tool, `x402://<tool>`.
    #[must_use]
    pub fn resource(&self) -> String {
        format!("x402://{}", self.tool)
    }

    /// Builds requirements with the fields shared by every family.
    ///
    /// `pay_to`, `asset` and `extra` are supplied by the strategy.
    #[must_use]
    pub fn base_requirements(
        &self,
        pay_to: String,
        asset: String,
        extra: Option<serde_json::Value>,
    ) -> PaymentRequirements {
        PaymentRequirements {
            scheme: ExactScheme.to_string(),
            network: self.network.name.clone(),
            max_amount_required: self.price.max_amount_required.clone(),
            resource: self.resource(),
            description: self.description.to_owned(),
            mime_type: TOOL_MIME_TYPE.to_owned(),
            output_schema: None,
            pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra,
        }
    }
}

/// Requirement shaping and signer compatibility for one network family.
pub trait FamilyStrategy: Send + Sync {
    /// The family served by this strategy.
    fn family(&self) -> NetworkFamily;

    /// Builds the requirements for a priced call on a network of this family.
    fn build_requirements<'a>(
        &'a self,
        ctx: RequirementsContext<'a>,
        facilitator: &'a dyn FacilitatorClient,
    ) -> BoxFuture<'a, Result<PaymentRequirements, RequirementsError>>;

    /// Returns the networks a signer bound to this family can pay on.
    fn signer_networks(&self, registry: &NetworkRegistry) -> Vec<String> {
        registry
            .in_family(self.family())
            .map(|n| n.name.clone())
            .collect()
    }
}

/// Strategy for account-signature (EVM) networks.
///
/// Addresses are emitted in EIP-55 checksum form and `extra` carries the
/// token's EIP-712 domain when one is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eip155Strategy;

impl Eip155Strategy {
    /// Parses an EVM address and returns its EIP-55 checksum form.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::InvalidAddress`] if `value` is not a
    /// 20-byte hex address.
    pub fn checksum(value: &str) -> Result<String, RequirementsError> {
        Address::from_str(value.trim())
            .map(|address| address.to_checksum(None))
            .map_err(|e| RequirementsError::InvalidAddress {
                address: value.to_owned(),
                reason: e.to_string(),
            })
    }
}

impl FamilyStrategy for Eip155Strategy {
    fn family(&self) -> NetworkFamily {
        NetworkFamily::Eip155
    }

    fn build_requirements<'a>(
        &'a self,
        ctx: RequirementsContext<'a>,
        _facilitator: &'a dyn FacilitatorClient,
    ) -> BoxFuture<'a, Result<PaymentRequirements, RequirementsError>> {
        Box::pin(async move {
            let pay_to = Self::checksum(ctx.pay_to)?;
            let asset = Self::checksum(&ctx.price.asset.address)?;
            let extra = ctx.price.asset.eip712.as_ref().map(|domain| {
                serde_json::json!({
                    "name": domain.name,
                    "version": domain.version,
                })
            });
            Ok(ctx.base_requirements(pay_to, asset, extra))
        })
    }
}

/// Strategy for fee-delegated (Solana) networks.
///
/// The facilitator pays transaction fees, so its fee payer address is
/// discovered through `supported()` on every build and placed in `extra`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaStrategy;

impl SolanaStrategy {
    /// Validates a base58 public key and returns its canonical encoding.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::InvalidAddress`] if `value` is not a
    /// valid public key.
    pub fn canonical(value: &str) -> Result<String, RequirementsError> {
        Pubkey::from_str(value.trim())
            .map(|key| key.to_string())
            .map_err(|e| RequirementsError::InvalidAddress {
                address: value.to_owned(),
                reason: e.to_string(),
            })
    }

    /// Asks the facilitator for its fee payer on `network`.
    ///
    /// The first supported kind matching the network and the `exact` scheme
    /// decides; it must carry a fee payer.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::MissingFeePayer`] if no fee payer is
    /// advertised and [`RequirementsError::Facilitator`] if the query fails.
    pub async fn fee_payer(
        facilitator: &dyn FacilitatorClient,
        network: &str,
    ) -> Result<String, RequirementsError> {
        let supported = facilitator.supported().await?;
        supported
            .kinds
            .iter()
            .find(|kind| kind.network == network && ExactScheme == kind.scheme)
            .and_then(|kind| kind.fee_payer())
            .map(str::to_owned)
            .ok_or_else(|| RequirementsError::MissingFeePayer(network.to_owned()))
    }
}

impl FamilyStrategy for SolanaStrategy {
    fn family(&self) -> NetworkFamily {
        NetworkFamily::Solana
    }

    fn build_requirements<'a>(
        &'a self,
        ctx: RequirementsContext<'a>,
        facilitator: &'a dyn FacilitatorClient,
    ) -> BoxFuture<'a, Result<PaymentRequirements, RequirementsError>> {
        Box::pin(async move {
            let pay_to = Self::canonical(ctx.pay_to)?;
            let asset = Self::canonical(&ctx.price.asset.address)?;
            let fee_payer = Self::fee_payer(facilitator, &ctx.network.name).await?;
            let extra = serde_json::json!({ "feePayer": fee_payer });
            Ok(ctx.base_requirements(pay_to, asset, Some(extra)))
        })
    }
}
