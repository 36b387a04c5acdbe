// src/wallet/typed_data.rs
//! EIP-712 typed data for verifications.
//!
//! A verifier signs this structure to vouch that the subject's field hashes
//! to `valueHash`. The API and anyone else can recover the verifier address
//! from the signature without trusting the API.
//!
//! ```text
//! domain  = EIP712Domain(name "VerifyENS", version "1", chainId, verifyingContract 0x0)
//! Verification(address verifierAddress,string verifiedEns,string field,
//!              bytes32 valueHash,string methodUrl,uint256 expiresAt)
//! ```

use crate::error::WalletError;
use crate::models::field::{FieldCommitment, FieldType};
use crate::utils::crypto::to_prefixed_hex;
use chrono::{DateTime, Duration, Utc};
use ethers::abi::{encode, Token};
use ethers::types::transaction::eip712::{EIP712Domain, Eip712, Eip712Error};
use ethers::types::{Address, Signature, H256, U256};
use ethers::utils::keccak256;
use serde_json::{json, Value};
use std::str::FromStr;

pub const DOMAIN_NAME: &str = "VerifyENS";
pub const DOMAIN_VERSION: &str = "1";
pub const PRIMARY_TYPE: &str = "Verification";
pub const VERIFICATION_TYPE: &str = "Verification(address verifierAddress,string verifiedEns,string field,bytes32 valueHash,string methodUrl,uint256 expiresAt)";

/// Validity used when the verifier does not pick an expiry.
pub const DEFAULT_VALIDITY_DAYS: i64 = 365;

/// The message a verifier signs for one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationMessage {
    /// Chain the signature is bound to via the domain.
    pub chain_id: u64,
    pub verifier_address: Address,
    pub verified_ens: String,
    pub field: FieldType,
    pub value_hash: FieldCommitment,
    /// Empty when no method URL was given.
    pub method_url: String,
    /// Unix seconds.
    pub expires_at: u64,
}

impl VerificationMessage {
    /// Expiry in unix seconds: the given instant, or one year from `now`.
    pub fn expiry_timestamp(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        let at = expires_at.unwrap_or_else(|| now + Duration::days(DEFAULT_VALIDITY_DAYS));
        at.timestamp().max(0) as u64
    }

    fn eip712_domain(&self) -> EIP712Domain {
        EIP712Domain {
            name: Some(DOMAIN_NAME.to_string()),
            version: Some(DOMAIN_VERSION.to_string()),
            chain_id: Some(U256::from(self.chain_id)),
            verifying_contract: Some(Address::zero()),
            salt: None,
        }
    }

    fn encode_struct(&self) -> [u8; 32] {
        let encoded = encode(&[
            Token::FixedBytes(keccak256(VERIFICATION_TYPE.as_bytes()).to_vec()),
            Token::Address(self.verifier_address),
            Token::FixedBytes(keccak256(self.verified_ens.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256(self.field.as_str().as_bytes()).to_vec()),
            Token::FixedBytes(self.value_hash.as_bytes().to_vec()),
            Token::FixedBytes(keccak256(self.method_url.as_bytes()).to_vec()),
            Token::Uint(U256::from(self.expires_at)),
        ]);
        keccak256(encoded)
    }

    /// Final 32-byte digest that gets signed:
    /// `keccak256(0x1901 || domainSeparator || structHash)`.
    pub fn digest(&self) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(66);
        preimage.extend_from_slice(&[0x19, 0x01]);
        preimage.extend_from_slice(&self.eip712_domain().separator());
        preimage.extend_from_slice(&self.encode_struct());
        keccak256(preimage)
    }

    /// `eth_signTypedData_v4` JSON for wallets that sign outside this process.
    pub fn to_typed_data_json(&self) -> Value {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "Verification": [
                    { "name": "verifierAddress", "type": "address" },
                    { "name": "verifiedEns", "type": "string" },
                    { "name": "field", "type": "string" },
                    { "name": "valueHash", "type": "bytes32" },
                    { "name": "methodUrl", "type": "string" },
                    { "name": "expiresAt", "type": "uint256" },
                ],
            },
            "primaryType": PRIMARY_TYPE,
            "domain": {
                "name": DOMAIN_NAME,
                "version": DOMAIN_VERSION,
                "chainId": self.chain_id,
                "verifyingContract": format!("0x{:x}", Address::zero()),
            },
            "message": {
                "verifierAddress": format!("0x{:x}", self.verifier_address),
                "verifiedEns": self.verified_ens,
                "field": self.field.as_str(),
                "valueHash": self.value_hash.to_hex(),
                "methodUrl": self.method_url,
                "expiresAt": self.expires_at.to_string(),
            },
        })
    }
}

impl Eip712 for VerificationMessage {
    type Error = Eip712Error;

    fn domain(&self) -> Result<EIP712Domain, Self::Error> {
        Ok(self.eip712_domain())
    }

    fn type_hash() -> Result<[u8; 32], Self::Error> {
        Ok(keccak256(VERIFICATION_TYPE.as_bytes()))
    }

    fn struct_hash(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.encode_struct())
    }

    fn encode_eip712(&self) -> Result<[u8; 32], Self::Error> {
        Ok(self.digest())
    }
}

/// `0x`-hex form of a 65-byte `r || s || v` signature.
pub fn signature_to_hex(signature: &Signature) -> String {
    to_prefixed_hex(&signature.to_vec())
}

/// Recovers the address that signed `message`.
pub fn recover_signer(message: &VerificationMessage, signature: &str) -> Result<Address, WalletError> {
    let signature = Signature::from_str(signature)
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))?;
    signature
        .recover(H256::from(message.digest()))
        .map_err(|e| WalletError::InvalidSignature(e.to_string()))
}
