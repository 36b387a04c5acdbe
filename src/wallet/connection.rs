// src/wallet/connection.rs
//! The verifier's wallet connection.
//!
//! Everything that needs "who is acting, on which chain, and can they sign"
//! receives a [`WalletConnection`] explicitly instead of reading it from
//! global state. Swapping the signer (local key, remote signer, test double)
//! does not touch any caller.

use crate::error::WalletError;
use crate::models::field::{FieldCommitment, FieldType};
use crate::wallet::typed_data::{signature_to_hex, VerificationMessage};
use async_trait::async_trait;
use ethers::types::{Address, Signature};
use std::sync::Arc;

/// Signing capability of a connected wallet.
#[async_trait]
pub trait TypedDataSigner: Send + Sync {
    /// Address whose key produces the signatures.
    fn address(&self) -> Address;

    /// Signs the EIP-712 digest of `message`.
    async fn sign_verification(&self, message: &VerificationMessage) -> Result<Signature, WalletError>;
}

/// Current address, chain and signing capability of the verifier.
#[derive(Clone)]
pub struct WalletConnection {
    address: Address,
    chain_id: u64,
    ens_name: Option<String>,
    signer: Arc<dyn TypedDataSigner>,
}

impl WalletConnection {
    pub fn new(signer: Arc<dyn TypedDataSigner>, chain_id: u64) -> Self {
        Self {
            address: signer.address(),
            chain_id,
            ens_name: None,
            signer,
        }
    }

    /// Attaches the primary ENS name of the connected address.
    pub fn with_ens_name(mut self, ens_name: Option<String>) -> Self {
        self.ens_name = ens_name.filter(|name| !name.trim().is_empty());
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn ens_name(&self) -> Option<&str> {
        self.ens_name.as_deref()
    }

    /// Lower-cased `0x` address, the form the API and attestations use.
    pub fn address_hex(&self) -> String {
        format!("0x{:x}", self.address)
    }

    /// Fails unless the wallet is on `expected`.
    pub fn ensure_chain(&self, expected: u64) -> Result<(), WalletError> {
        if self.chain_id == expected {
            Ok(())
        } else {
            Err(WalletError::ChainMismatch {
                expected,
                actual: self.chain_id,
            })
        }
    }

    /// Builds and signs the verification message on the current chain.
    ///
    /// Returns the message together with its `0x`-hex signature.
    pub async fn sign_verification(
        &self,
        verified_ens: &str,
        field: &FieldType,
        value_hash: FieldCommitment,
        method_url: Option<&str>,
        expires_at: u64,
    ) -> Result<(VerificationMessage, String), WalletError> {
        let message = VerificationMessage {
            chain_id: self.chain_id,
            verifier_address: self.address,
            verified_ens: verified_ens.to_string(),
            field: field.clone(),
            value_hash,
            method_url: method_url.unwrap_or_default().to_string(),
            expires_at,
        };
        let signature = self.signer.sign_verification(&message).await?;
        Ok((message, signature_to_hex(&signature)))
    }
}

impl std::fmt::Debug for WalletConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnection")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("ens_name", &self.ens_name)
            .finish()
    }
}
