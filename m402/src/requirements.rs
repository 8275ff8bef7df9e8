//! Building payment requirements for priced tool calls.
//!
//! [`RequirementsBuilder`] looks up the target network, picks the
//! [`FamilyStrategy`] registered for its family and lets it shape the
//! family-specific fields. Building is deterministic: the same inputs always
//! produce the same [`PaymentRequirements`].

use std::sync::Arc;

use crate::facilitator::{FacilitatorClient, FacilitatorError};
use crate::family::{
    DEFAULT_MAX_TIMEOUT_SECONDS, Eip155Strategy, FamilyStrategy, RequirementsContext,
    SolanaStrategy,
};
use crate::networks::{NetworkFamily, NetworkRegistry};
use crate::price::ResolvedPrice;
use crate::proto::PaymentRequirements;

/// Configuration failures while building requirements.
///
/// None of these are transient; they indicate a mismatch between the
/// server's configuration and the facilitator or network table.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RequirementsError {
    /// The network is unknown, or no strategy handles its family.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// The facilitator advertises no fee payer for a fee-delegated network.
    #[error("The facilitator did not provide a fee payer for network: {0}.")]
    MissingFeePayer(String),
    /// A recipient or asset address is malformed for the network family.
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Parser message.
        reason: String,
    },
    /// The facilitator could not be queried.
    #[error("Facilitator request failed: {0}")]
    Facilitator(#[from] FacilitatorError),
}

/// Builds [`PaymentRequirements`] by dispatching on network family.
///
/// # Example
///
/// ```ignore
/// let builder = RequirementsBuilder::new(NetworkRegistry::with_known_networks());
/// let price = UsdcPriceResolver::default().resolve(price, "base")?;
/// let requirements = builder
///     .build("get_weather", "Weather lookup", &price, "base", pay_to, &facilitator)
///     .await?;
/// ```
#[derive(Clone)]
pub struct RequirementsBuilder {
    registry: NetworkRegistry,
    strategies: Vec<Arc<dyn FamilyStrategy>>,
    max_timeout_seconds: u64,
}

impl std::fmt::Debug for RequirementsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let families: Vec<_> = self.strategies.iter().map(|s| s.family()).collect();
        f.debug_struct("RequirementsBuilder")
            .field("networks", &self.registry.len())
            .field("families", &families)
            .field("max_timeout_seconds", &self.max_timeout_seconds)
            .finish()
    }
}

impl Default for RequirementsBuilder {
    fn default() -> Self {
        Self::new(NetworkRegistry::with_known_networks())
    }
}

impl RequirementsBuilder {
    /// Creates a builder with the EVM and Solana strategies registered.
    #[must_use]
    pub fn new(registry: NetworkRegistry) -> Self {
        Self {
            registry,
            strategies: vec![Arc::new(Eip155Strategy), Arc::new(SolanaStrategy)],
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
        }
    }

    /// Registers a strategy, replacing the one serving the same family.
    #[must_use]
    pub fn with_strategy<S: FamilyStrategy + 'static>(mut self, strategy: S) -> Self {
        let family = strategy.family();
        self.strategies.retain(|s| s.family() != family);
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Overrides the payment validity window (default 300 seconds).
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Returns the network registry.
    #[must_use]
    pub const fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Returns the strategy serving `family`, if any.
    #[must_use]
    pub fn strategy(&self, family: NetworkFamily) -> Option<&dyn FamilyStrategy> {
        self.strategies
            .iter()
            .find(|s| s.family() == family)
            .map(AsRef::as_ref)
    }

    /// Returns the networks a signer bound to `family` can pay on.
    #[must_use]
    pub fn signer_networks(&self, family: NetworkFamily) -> Vec<String> {
        self.strategy(family)
            .map(|s| s.signer_networks(&self.registry))
            .unwrap_or_default()
    }

    /// Builds the requirements for one priced call.
    ///
    /// # Errors
    ///
    /// Returns [`RequirementsError::UnsupportedNetwork`] for an unknown
    /// network, and whatever the family strategy reports otherwise.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "m402.requirements.build",
            skip_all,
            fields(tool = %tool, network = %network),
            err
        )
    )]
    pub async fn build(
        &self,
        tool: &str,
        description: &str,
        price: &ResolvedPrice,
        network: &str,
        pay_to: &str,
        facilitator: &dyn FacilitatorClient,
    ) -> Result<PaymentRequirements, RequirementsError> {
        let info = self
            .registry
            .get(network)
            .ok_or_else(|| RequirementsError::UnsupportedNetwork(network.to_owned()))?;
        let strategy = self
            .strategy(info.family)
            .ok_or_else(|| RequirementsError::UnsupportedNetwork(network.to_owned()))?;
        let ctx = RequirementsContext {
            tool,
            description,
            network: info,
            pay_to,
            price,
            max_timeout_seconds: self.max_timeout_seconds,
        };
        strategy.build_requirements(ctx, facilitator).await
    }
}
