//! Conversion of fiat prices into atomic token amounts.
//!
//! Prices are expressed in US dollars as [`Decimal`] values and converted
//! into the atomic unit of the USDC deployment on the target network.
//! Floating point is never involved: a price that cannot be represented
//! exactly in the token's precision is rejected rather than rounded.

use rust_decimal::Decimal;

use crate::networks::{AssetInfo, NetworkRegistry};

/// Errors produced while resolving a price.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PriceError {
    /// The network is not known to the resolver.
    #[error("no asset is configured for network: {0}")]
    UnknownNetwork(String),
    /// The price is below zero.
    #[error("price must not be negative: {0}")]
    Negative(Decimal),
    /// The price has more fractional digits than the asset supports.
    #[error("price {price} cannot be represented with {decimals} decimals")]
    Precision {
        /// The requested price.
        price: Decimal,
        /// Decimals of the target asset.
        decimals: u8,
    },
    /// The atomic amount does not fit the decimal range.
    #[error("price {0} overflows the atomic amount range")]
    Overflow(Decimal),
}

/// An atomic amount together with the asset it is denominated in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrice {
    /// Atomic amount as a decimal integer string (e.g., `"50000"`).
    pub max_amount_required: String,
    /// The asset the amount is denominated in.
    pub asset: AssetInfo,
}

/// Converts a fiat price on a network into an atomic amount and asset.
pub trait PriceResolver: Send + Sync {
    /// Resolves `price` (in US dollars) for `network`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError`] when the network has no known asset or the price
    /// cannot be represented exactly in the asset's precision.
    fn resolve(&self, price: Decimal, network: &str) -> Result<ResolvedPrice, PriceError>;
}

impl<T: PriceResolver + ?Sized> PriceResolver for std::sync::Arc<T> {
    fn resolve(&self, price: Decimal, network: &str) -> Result<ResolvedPrice, PriceError> {
        (**self).resolve(price, network)
    }
}

/// Prices in USDC using the deployments of a [`NetworkRegistry`].
#[derive(Debug, Clone)]
pub struct UsdcPriceResolver {
    registry: NetworkRegistry,
}

impl UsdcPriceResolver {
    /// Creates a resolver over the given registry.
    #[must_use]
    pub const fn new(registry: NetworkRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry backing this resolver.
    #[must_use]
    pub const fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }
}

impl Default for UsdcPriceResolver {
    fn default() -> Self {
        Self::new(NetworkRegistry::with_known_networks())
    }
}

impl PriceResolver for UsdcPriceResolver {
    fn resolve(&self, price: Decimal, network: &str) -> Result<ResolvedPrice, PriceError> {
        let info = self
            .registry
            .get(network)
            .ok_or_else(|| PriceError::UnknownNetwork(network.to_owned()))?;
        let amount = to_atomic(price, info.usdc.decimals)?;
        Ok(ResolvedPrice {
            max_amount_required: amount,
            asset: info.usdc.clone(),
        })
    }
}

/// Scales `price` by `10^decimals`, requiring an exact integer result.
///
/// # Errors
///
/// Returns [`PriceError`] for negative prices, excess precision or overflow.
pub fn to_atomic(price: Decimal, decimals: u8) -> Result<String, PriceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(PriceError::Negative(price));
    }
    let mut scale = Decimal::ONE;
    for _ in 0..decimals {
        scale = scale
            .checked_mul(Decimal::TEN)
            .ok_or(PriceError::Overflow(price))?;
    }
    let amount = price
        .checked_mul(scale)
        .ok_or(PriceError::Overflow(price))?;
    if !amount.fract().is_zero() {
        return Err(PriceError::Precision { price, decimals });
    }
    Ok(amount.trunc().normalize().abs().to_string())
}
