// src/wallet/mod.rs
//! Verifier wallet: key handling, connection context and EIP-712 signing.

pub mod connection;
pub mod key_management;
pub mod typed_data;
