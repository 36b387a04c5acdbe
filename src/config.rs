// src/config.rs
//! Runtime configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (Sepolia for signing, Base Sepolia for attestations)
//! 2. An optional TOML file (`verify-ens.toml` unless a path is given)
//! 3. Environment variables prefixed with `VERIFYENS_`, `__` for nesting,
//!    e.g. `VERIFYENS_API_URL`, `VERIFYENS_ATTESTATION__RPC_URL`
//!
//! Call `dotenv().ok()` before [`Settings::load`] to pick up a `.env` file.

use crate::error::ConfigError;
use config::{Config, Environment, File};
use ethers::types::Address;
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;

pub const DEFAULT_CONFIG_FILE: &str = "verify-ens";
pub const DEFAULT_API_URL: &str = "http://localhost:8080";
/// Ethereum Sepolia, where verifications are signed and ENS names resolve.
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
/// Base Sepolia, where attestations are written.
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84_532;

/// Attestation registry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AttestationSettings {
    /// Write attestations on chain at all.
    pub enabled: bool,
    pub chain_id: u64,
    pub rpc_url: String,
    pub eas_address: String,
    pub schema_registry_address: String,
    /// Base URL of the EAS explorer for this chain.
    pub explorer_url: String,
    /// Confirmations to wait for before reading the attestation UID.
    pub confirmations: usize,
}

impl AttestationSettings {
    pub fn eas_address(&self) -> Result<Address, ConfigError> {
        parse_address("attestation.eas_address", &self.eas_address)
    }

    pub fn schema_registry_address(&self) -> Result<Address, ConfigError> {
        parse_address(
            "attestation.schema_registry_address",
            &self.schema_registry_address,
        )
    }
}

/// Top level settings.
#[derive(Clone, Deserialize)]
pub struct Settings {
    /// Base URL of the VerifyENS API.
    pub api_url: String,
    pub request_timeout_secs: u64,
    /// Chain the wallet must be on when signing verifications.
    pub signing_chain_id: u64,
    /// RPC endpoint used for ENS reverse resolution.
    pub ens_rpc_url: String,
    /// Hex private key of the verifier wallet.
    #[serde(default)]
    pub private_key: Option<String>,
    /// ENS name of the verifier, skipping reverse resolution when set.
    #[serde(default)]
    pub ens_name: Option<String>,
    /// Address the local agent API listens on.
    pub bind_address: String,
    pub attestation: AttestationSettings,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("signing_chain_id", &self.signing_chain_id)
            .field("ens_rpc_url", &self.ens_rpc_url)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("ens_name", &self.ens_name)
            .field("bind_address", &self.bind_address)
            .field("attestation", &self.attestation)
            .finish()
    }
}

impl Settings {
    /// Loads settings from defaults, `verify-ens.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads settings using `file` (extension optional) as the file layer.
    /// A missing file is not an error.
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("VERIFYENS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        let settings: Settings = Self::builder()?.build()?.try_deserialize()?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("api_url", DEFAULT_API_URL)?
            .set_default("request_timeout_secs", 30)?
            .set_default("signing_chain_id", SEPOLIA_CHAIN_ID)?
            .set_default("ens_rpc_url", "https://ethereum-sepolia-rpc.publicnode.com")?
            .set_default("bind_address", "127.0.0.1:3000")?
            .set_default("attestation.enabled", true)?
            .set_default("attestation.chain_id", BASE_SEPOLIA_CHAIN_ID)?
            .set_default("attestation.rpc_url", "https://sepolia.base.org")?
            .set_default(
                "attestation.eas_address",
                "0x4200000000000000000000000000000000000021",
            )?
            .set_default(
                "attestation.schema_registry_address",
                "0x4200000000000000000000000000000000000020",
            )?
            .set_default("attestation.explorer_url", "https://base-sepolia.easscan.org")?
            .set_default("attestation.confirmations", 1)?)
    }

    /// Rejects settings that would only fail later, at first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "api_url must be an http(s) url, got {}",
                self.api_url
            )));
        }
        self.bind_address()?;
        if self.attestation.enabled {
            self.attestation.eas_address()?;
            self.attestation.schema_registry_address()?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_address.parse().map_err(|e| {
            ConfigError::Invalid(format!("bind_address {}: {}", self.bind_address, e))
        })
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("{} {}: {}", key, value, e)))
}
