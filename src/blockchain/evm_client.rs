// src/blockchain/evm_client.rs
//! EVM chain client.
//!
//! Thin wrapper over an ethers HTTP provider plus a signing middleware for
//! the verifier's key. Calldata is built by the caller; this module only
//! sends it and waits for the receipt.

use crate::error::RegistryError;
use crate::wallet::key_management::KeyManager;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::LocalWallet;
use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U64};
use ethers_core::utils::keccak256;
use log::{debug, info};
use std::sync::Arc;

type SignerClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Calldata for `signature` (e.g. `"register(string,address,bool)"`) with
/// `tokens` as arguments.
pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut calldata = keccak256(signature.as_bytes())[..4].to_vec();
    calldata.extend(encode(tokens));
    calldata
}

/// Client bound to one chain and one sender.
#[derive(Clone)]
pub struct EvmClient {
    provider: Arc<Provider<Http>>,
    signer: Arc<SignerClient>,
    chain_id: u64,
    confirmations: usize,
}

impl EvmClient {
    /// Connects to `rpc_url` and checks it serves `expected_chain_id`.
    ///
    /// # Errors
    /// - `Provider` if the URL is invalid or the node cannot be reached
    /// - `WrongChain` if the node is on another chain
    pub async fn connect(
        rpc_url: &str,
        expected_chain_id: u64,
        keys: &KeyManager,
        confirmations: usize,
    ) -> Result<Self, RegistryError> {
        let provider = Arc::new(
            Provider::<Http>::try_from(rpc_url)
                .map_err(|e| RegistryError::Provider(format!("{}: {}", rpc_url, e)))?,
        );
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| RegistryError::Provider(e.to_string()))?
            .as_u64();
        if chain_id != expected_chain_id {
            return Err(RegistryError::WrongChain {
                expected: expected_chain_id,
                actual: chain_id,
            });
        }

        let signer = Arc::new(SignerMiddleware::new(
            provider.clone(),
            keys.wallet_for_chain(chain_id),
        ));
        info!("connected to chain {} as 0x{:x}", chain_id, keys.address());

        Ok(Self {
            provider,
            signer,
            chain_id,
            confirmations: confirmations.max(1),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Address transactions are sent from.
    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// Sends `calldata` to `to` and waits for the receipt.
    ///
    /// # Errors
    /// - `Contract` if the node rejects the transaction (including gas
    ///   estimation failures on revert)
    /// - `Dropped` if it disappears from the mempool
    /// - `Reverted` if it was mined with status 0
    pub async fn send_transaction(&self, to: Address, calldata: Vec<u8>) -> Result<TransactionReceipt, RegistryError> {
        let tx = TransactionRequest::new().to(to).data(calldata);
        let pending = self
            .signer
            .send_transaction(tx, None)
            .await
            .map_err(|e| RegistryError::Contract(e.to_string()))?;
        let tx_hash: H256 = *pending;
        debug!("sent {:?} to {:?}", tx_hash, to);

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| RegistryError::Provider(e.to_string()))?
            .ok_or_else(|| RegistryError::Dropped(format!("{:?}", tx_hash)))?;
        if receipt.status != Some(U64::from(1)) {
            return Err(RegistryError::Reverted(format!("{:?}", tx_hash)));
        }
        Ok(receipt)
    }

    /// Read-only call; returns the raw return data.
    pub async fn query_contract(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes, RegistryError> {
        let tx = TransactionRequest::new().to(to).data(calldata);
        self.provider
            .call(&tx.into(), None)
            .await
            .map_err(|e| RegistryError::Contract(e.to_string()))
    }
}

impl std::fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmClient")
            .field("chain_id", &self.chain_id)
            .field("sender", &self.sender())
            .field("confirmations", &self.confirmations)
            .finish()
    }
}
