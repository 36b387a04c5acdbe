// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all operations, so
//! every digest produced here can be recomputed by a Solidity contract or by
//! viem/ethers on the browser side.

use ethers::utils::{hex, keccak256};

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Renders bytes as a lowercase hex string with a `0x` prefix.
///
/// This is the canonical wire form for hashes, commitments and signatures
/// exchanged with the VerifyENS API.
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parses a `0x`-prefixed (or bare) hex string into exactly 32 bytes.
///
/// Returns `None` when the input is not valid hex or has the wrong length.
pub fn parse_bytes32(value: &str) -> Option<[u8; 32]> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.len() != 64 {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    bytes.try_into().ok()
}
