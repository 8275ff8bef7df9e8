//! Known networks, their families and USDC token deployments.
//!
//! Networks are identified by their human-readable name (e.g., `"base"`,
//! `"solana-devnet"`). Each name belongs to exactly one [`NetworkFamily`],
//! which decides how payment requirements are shaped for it.
//!
//! [`NetworkRegistry::with_known_networks`] is pre-populated with the USDC
//! deployments the tool-call integration supports out of the box. Additional
//! networks can be registered at startup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;

/// `IoTeX` Mainnet chain ID.
pub const IOTEX_MAINNET: u64 = 4689;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;

/// Sei Mainnet chain ID.
pub const SEI_MAINNET: u64 = 1329;

/// Sei Testnet chain ID.
pub const SEI_TESTNET: u64 = 1328;

/// Default token decimals for USDC.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

/// Default EIP-712 domain version for USDC.
pub const DEFAULT_USDC_VERSION: &str = "2";

/// A class of networks sharing one payment-requirement shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkFamily {
    /// Account-signature networks (EVM chains). Requirements carry an
    /// EIP-712 domain for the token.
    Eip155,
    /// Fee-delegated networks. Requirements carry the facilitator's fee payer.
    Solana,
}

impl fmt::Display for NetworkFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eip155 => f.write_str("eip155"),
            Self::Solana => f.write_str("solana"),
        }
    }
}

/// EIP-712 domain parameters of a token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Domain {
    /// Domain name (e.g., "USD Coin").
    pub name: String,
    /// Domain version (e.g., "2").
    pub version: String,
}

/// A token deployment on a particular network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Token contract or mint address.
    pub address: String,
    /// Number of decimal places of the token's atomic unit.
    pub decimals: u8,
    /// EIP-712 domain, present for account-signature networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eip712: Option<Eip712Domain>,
}

/// A known network with the USDC deployment used for pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g., "base-sepolia").
    pub name: String,
    /// The family the network belongs to.
    pub family: NetworkFamily,
    /// EIP-155 chain ID, for account-signature networks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// The USDC deployment on this network.
    pub usdc: AssetInfo,
}

impl NetworkInfo {
    /// Describes an EVM network with a USDC deployment using the given EIP-712 name.
    #[must_use]
    pub fn eip155(name: &str, chain_id: u64, usdc: &str, domain_name: &str) -> Self {
        Self {
            name: name.to_owned(),
            family: NetworkFamily::Eip155,
            chain_id: Some(chain_id),
            usdc: AssetInfo {
                address: usdc.to_owned(),
                decimals: DEFAULT_TOKEN_DECIMALS,
                eip712: Some(Eip712Domain {
                    name: domain_name.to_owned(),
                    version: DEFAULT_USDC_VERSION.to_owned(),
                }),
            },
        }
    }

    /// Describes a Solana cluster with a USDC mint.
    #[must_use]
    pub fn solana(name: &str, usdc_mint: &str) -> Self {
        Self {
            name: name.to_owned(),
            family: NetworkFamily::Solana,
            chain_id: None,
            usdc: AssetInfo {
                address: usdc_mint.to_owned(),
                decimals: DEFAULT_TOKEN_DECIMALS,
                eip712: None,
            },
        }
    }
}

/// Returns all networks the integration knows out of the box.
#[must_use]
pub fn known_networks() -> Vec<NetworkInfo> {
    vec![
        NetworkInfo::eip155(
            "base",
            BASE_MAINNET,
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
            "USD Coin",
        ),
        NetworkInfo::eip155(
            "base-sepolia",
            BASE_SEPOLIA,
            "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "USDC",
        ),
        NetworkInfo::eip155(
            "avalanche",
            AVALANCHE_MAINNET,
            "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E",
            "USD Coin",
        ),
        NetworkInfo::eip155(
            "avalanche-fuji",
            AVALANCHE_FUJI,
            "0x5425890298aed601595a70AB815c96711a31Bc65",
            "USD Coin",
        ),
        NetworkInfo::eip155(
            "iotex",
            IOTEX_MAINNET,
            "0xcdf79194c6c285077a58da47641d4dbe51f63542",
            "Bridged USDC",
        ),
        NetworkInfo::eip155(
            "polygon",
            POLYGON_MAINNET,
            "0x3c499c542cef5e3811e1192ce70d8cc03d5c3359",
            "USD Coin",
        ),
        NetworkInfo::eip155(
            "polygon-amoy",
            POLYGON_AMOY,
            "0x41E94Eb019C0762f9Bfcf9Fb1E58725BfB0e7582",
            "USDC",
        ),
        NetworkInfo::eip155(
            "sei",
            SEI_MAINNET,
            "0xe15fc38f6d8c56af07bbcbe3baf5708a2bf42392",
            "USDC",
        ),
        NetworkInfo::eip155(
            "sei-testnet",
            SEI_TESTNET,
            "0x4fcf1784b31630811181f670aea7a7bef803eaed",
            "USDC",
        ),
        NetworkInfo::solana("solana", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
        NetworkInfo::solana(
            "solana-devnet",
            "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
        ),
    ]
}

/// Registry of networks keyed by name.
///
/// Registration order is preserved, so [`in_family`](Self::in_family)
/// iterates deterministically.
///
/// # Example
///
/// ```
/// use m402::networks::{NetworkFamily, NetworkRegistry};
///
/// let registry = NetworkRegistry::with_known_networks();
/// assert_eq!(registry.get("base").map(|n| n.family), Some(NetworkFamily::Eip155));
/// assert_eq!(registry.by_chain_id(84532).map(|n| n.name.as_str()), Some("base-sepolia"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: Vec<NetworkInfo>,
}

impl NetworkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            networks: Vec::new(),
        }
    }

    /// Creates a registry pre-populated with [`known_networks`].
    #[must_use]
    pub fn with_known_networks() -> Self {
        let mut registry = Self::new();
        for network in known_networks() {
            registry.register(network);
        }
        registry
    }

    /// Registers a network, replacing any previous entry with the same name.
    pub fn register(&mut self, network: NetworkInfo) {
        if let Some(existing) = self.networks.iter_mut().find(|n| n.name == network.name) {
            *existing = network;
        } else {
            self.networks.push(network);
        }
    }

    /// Builder-style method: registers a network and returns `self`.
    #[must_use]
    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.register(network);
        self
    }

    /// Looks up a network by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NetworkInfo> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Looks up an account-signature network by its EIP-155 chain ID.
    #[must_use]
    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkInfo> {
        self.networks.iter().find(|n| n.chain_id == Some(chain_id))
    }

    /// Iterates over the networks belonging to `family`.
    pub fn in_family(&self, family: NetworkFamily) -> impl Iterator<Item = &NetworkInfo> {
        self.networks.iter().filter(move |n| n.family == family)
    }

    /// Returns the number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Returns `true` if no networks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
