// src/main.rs

//! # verify-ens agent - Main Entry Point
//!
//! Loads settings, connects the verifier wallet and serves the local agent
//! API.
//!
//! ## Architecture Overview
//! 1. **Wallet Layer**: `KeyManager` and `WalletConnection` sign verifications
//! 2. **Blockchain Layer**: `EvmClient` + `EasClient` write attestations
//! 3. **Services Layer**: `ApiClient`, `Verifier` and the agent `ApiServer`
//!
//! ## Environment Variables
//! - `VERIFYENS_PRIVATE_KEY`: verifier wallet private key (required)
//! - `VERIFYENS_API_URL`: VerifyENS API (default: http://localhost:8080)
//! - `VERIFYENS_ENS_NAME`: verifier ENS name, skips reverse resolution
//! - `VERIFYENS_ATTESTATION__ENABLED`: write EAS attestations (default: true)
//! - `RUST_LOG`: log filter (default: info)

use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use std::sync::Arc;
use verify_ens::blockchain::eas_client::EasClient;
use verify_ens::blockchain::ens::resolve_verifier_name;
use verify_ens::blockchain::evm_client::EvmClient;
use verify_ens::config::Settings;
use verify_ens::services::api_client::ApiClient;
use verify_ens::services::api_server::ApiServer;
use verify_ens::services::verification_flow::Verifier;
use verify_ens::wallet::connection::WalletConnection;
use verify_ens::wallet::key_management::KeyManager;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load `.env`, settings and logging
/// 2. Load the verifier key and resolve its ENS name
/// 3. Connect to the attestation chain (optional)
/// 4. Start the agent API
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load settings")?;
    let private_key = settings
        .private_key
        .as_deref()
        .context("VERIFYENS_PRIVATE_KEY must be set")?;
    let keys = KeyManager::from_private_key(private_key)?;
    info!("verifier address 0x{:x}", keys.address());

    // No ENS name only restricts what the agent may do.
    let ens_name = match resolve_verifier_name(
        settings.ens_name.as_deref(),
        &settings.ens_rpc_url,
        keys.address(),
    )
    .await
    {
        Ok(name) => name,
        Err(e) => {
            warn!("ENS reverse lookup failed: {}", e);
            None
        }
    };
    match &ens_name {
        Some(name) => info!("verifying as {}", name),
        None => warn!("no ENS name: only World ID verifications are possible"),
    }

    let wallet = WalletConnection::new(Arc::new(keys.clone()), settings.signing_chain_id)
        .with_ens_name(ens_name);
    let api = ApiClient::from_settings(&settings)?;
    let mut verifier = Verifier::new(api, wallet, settings.signing_chain_id);

    let attestation = &settings.attestation;
    if attestation.enabled {
        match EvmClient::connect(
            &attestation.rpc_url,
            attestation.chain_id,
            &keys,
            attestation.confirmations,
        )
        .await
        {
            Ok(client) => {
                let eas = EasClient::from_settings(client, attestation)?;
                verifier = verifier.with_registry(Arc::new(eas), &attestation.explorer_url);
            }
            Err(e) => warn!("attestations disabled: {}", e),
        }
    }

    let addr = settings.bind_address()?;
    ApiServer::new(verifier).run(addr).await?;
    Ok(())
}
