//! Payment configuration for servers and clients.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax and
//! are resolved after `.env` has been loaded.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! network = "base-sepolia"
//! recipient = "$PAY_TO_ADDRESS"
//! facilitator_url = "https://x402.org/facilitator"
//!
//! [client]
//! max_payment_value = 100000
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG`: path to configuration file (default: `m402.toml`)
//! - Any variable referenced by `$VAR` in the config file

use std::path::Path;
use std::sync::Arc;

use alloy_primitives::U256;
use m402::facilitator::FacilitatorClient;
use m402::family::DEFAULT_MAX_TIMEOUT_SECONDS;
use m402::proto::DEFAULT_X402_VERSION;
use m402::requirements::RequirementsBuilder;
use serde::{Deserialize, Serialize};

use crate::client::{DEFAULT_MAX_PAYMENT_VALUE, X402ClientConfig};
use crate::server::PaymentGate;

/// Path used when `CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "m402.toml";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// The path that was read.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML or has the wrong shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A section required by the caller is absent.
    #[error("Missing [{0}] section")]
    MissingSection(&'static str),
    /// The facilitator client could not be built from the configured URL.
    #[cfg(feature = "http")]
    #[error(transparent)]
    Facilitator(#[from] m402_http::HttpFacilitatorError),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct M402Config {
    /// Settings of a paid tool server.
    #[serde(default)]
    pub server: Option<ServerPaymentConfig>,
    /// Settings of a paying client.
    #[serde(default)]
    pub client: ClientPaymentConfig,
}

/// Settings of a paid tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPaymentConfig {
    /// Network every paid tool charges on (e.g. `base-sepolia`).
    pub network: String,
    /// Address receiving the payments.
    pub recipient: String,
    /// Base URL of the facilitator.
    pub facilitator_url: String,
    /// Protocol version (default: `1`).
    #[serde(default = "default_version")]
    pub version: u32,
    /// Payment validity window in seconds (default: `300`).
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
}

/// Settings of a paying client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPaymentConfig {
    /// Spend cap per call in atomic units (default: `100000`, 0.10 USDC).
    #[serde(default = "default_max_payment_value")]
    pub max_payment_value: u64,
    /// Protocol version (default: `1`).
    #[serde(default = "default_version")]
    pub version: u32,
}

impl Default for ClientPaymentConfig {
    fn default() -> Self {
        Self {
            max_payment_value: DEFAULT_MAX_PAYMENT_VALUE,
            version: DEFAULT_X402_VERSION,
        }
    }
}

const fn default_version() -> u32 {
    DEFAULT_X402_VERSION
}

const fn default_max_timeout_seconds() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

const fn default_max_payment_value() -> u64 {
    DEFAULT_MAX_PAYMENT_VALUE
}

impl M402Config {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `m402.toml` in the current directory.
    ///
    /// A `.env` file, if present, is loaded first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path = std::env::var("CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text, expanding `$VAR` references.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// Returns the server section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSection`] if there is none.
    pub fn server(&self) -> Result<&ServerPaymentConfig, ConfigError> {
        self.server
            .as_ref()
            .ok_or(ConfigError::MissingSection("server"))
    }
}

impl ServerPaymentConfig {
    /// Builds a payment gate over the given facilitator.
    #[must_use]
    pub fn gate(&self, facilitator: Arc<dyn FacilitatorClient>) -> PaymentGate {
        PaymentGate::new(facilitator, &self.network, &self.recipient)
            .with_version(self.version)
            .with_requirements_builder(
                RequirementsBuilder::default().with_max_timeout_seconds(self.max_timeout_seconds),
            )
    }

    /// Builds an HTTP client for the configured facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Facilitator`] if the URL is invalid.
    #[cfg(feature = "http")]
    pub fn facilitator(&self) -> Result<m402_http::HttpFacilitatorClient, ConfigError> {
        Ok(m402_http::HttpFacilitatorClient::try_from(
            self.facilitator_url.as_str(),
        )?)
    }

    /// Builds a payment gate talking to the configured facilitator over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Facilitator`] if the URL is invalid.
    #[cfg(feature = "http")]
    pub fn http_gate(&self) -> Result<PaymentGate, ConfigError> {
        Ok(self.gate(Arc::new(self.facilitator()?)))
    }
}

impl ClientPaymentConfig {
    /// Converts into a client configuration without a confirmation callback.
    #[must_use]
    pub fn to_client_config(&self) -> X402ClientConfig {
        X402ClientConfig::default()
            .with_max_payment_value(U256::from(self.max_payment_value))
            .with_version(self.version)
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();

        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() && (closed || !braced) => result.push_str(&value),
            _ if braced => {
                result.push_str("${");
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}
