// src/wallet/key_management.rs
//! Cryptographic key management for the verifier wallet.
//!
//! Wraps a secp256k1 key (via `k256`) in an ethers [`LocalWallet`] so the same
//! key can sign EIP-712 verifications on one chain and send attestation
//! transactions on another.

use crate::error::WalletError;
use crate::wallet::connection::TypedDataSigner;
use crate::wallet::typed_data::VerificationMessage;
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Signature};
use ethers::utils::hex;
use k256::ecdsa::SigningKey;

/// Holds the verifier's signing key.
///
/// # Security Notes
/// - The secret key is never exposed or logged
/// - `Debug` prints only the address
#[derive(Clone)]
pub struct KeyManager {
    wallet: LocalWallet,
}

impl KeyManager {
    /// Loads a key from hex (with or without `0x`).
    ///
    /// # Errors
    /// `InvalidPrivateKey` when the input is not 32 bytes of hex or is not a
    /// valid secp256k1 scalar.
    pub fn from_private_key(private_key: &str) -> Result<Self, WalletError> {
        let digits = private_key.trim();
        let digits = digits.strip_prefix("0x").unwrap_or(digits);
        let bytes = hex::decode(digits)
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(WalletError::InvalidPrivateKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self {
            wallet: LocalWallet::from(signing_key),
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// The wallet bound to `chain_id`, for sending transactions.
    pub fn wallet_for_chain(&self, chain_id: u64) -> LocalWallet {
        self.wallet.clone().with_chain_id(chain_id)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address())
            .finish()
    }
}

#[async_trait]
impl TypedDataSigner for KeyManager {
    fn address(&self) -> Address {
        KeyManager::address(self)
    }

    async fn sign_verification(&self, message: &VerificationMessage) -> Result<Signature, WalletError> {
        self.wallet
            .sign_typed_data(message)
            .await
            .map_err(|e| WalletError::Signing(e.to_string()))
    }
}
