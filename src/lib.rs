// src/lib.rs

//! # verify-ens
//!
//! Verifier-side toolkit for VerifyENS: commit to personal fields tied to an
//! ENS name, sign verifications with EIP-712, record them with the VerifyENS
//! API and optionally as EAS attestations.
//!
//! The core is [`utils::commitment::commit_field`]; everything else is the
//! plumbing around it.

pub mod blockchain;    // EVM client, EAS attestations, ENS lookup
pub mod config;        // Layered settings
pub mod error;         // Error types per layer
pub mod models;        // Wire and domain types
pub mod services;      // API client, reveal gate, verification flow, agent API
pub mod utils;         // Commitments and hashing helpers
pub mod wallet;        // Keys, wallet connection, typed data

pub use error::{VerifyError, VerifyResult};
pub use models::field::{FieldCommitment, FieldType};
pub use utils::commitment::commit_field;
