// src/blockchain/ens.rs
//! ENS reverse resolution for the verifier address.

use crate::error::RegistryError;
use ethers::providers::{Http, Middleware, Provider, ProviderError};
use ethers::types::Address;
use log::{debug, info};

/// Primary ENS name of `address`, or `None` when it has none.
///
/// A reverse record that does not resolve forward to `address` is treated
/// as no name.
pub async fn lookup_primary_name(rpc_url: &str, address: Address) -> Result<Option<String>, RegistryError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| RegistryError::Provider(format!("{}: {}", rpc_url, e)))?;
    match provider.lookup_address(address).await {
        Ok(name) if !name.trim().is_empty() => {
            info!("0x{:x} is {}", address, name);
            Ok(Some(name))
        }
        Ok(_) => Ok(None),
        Err(ProviderError::EnsError(reason)) | Err(ProviderError::EnsNotOwned(reason)) => {
            debug!("no primary name for 0x{:x}: {}", address, reason);
            Ok(None)
        }
        Err(e) => Err(RegistryError::Provider(e.to_string())),
    }
}

/// The configured name if set, otherwise the reverse-resolved one.
pub async fn resolve_verifier_name(
    configured: Option<&str>,
    rpc_url: &str,
    address: Address,
) -> Result<Option<String>, RegistryError> {
    match configured.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => Ok(Some(name.to_lowercase())),
        None => lookup_primary_name(rpc_url, address).await,
    }
}
