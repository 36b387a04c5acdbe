// src/models/attestation.rs
//! Attestation data model.
//!
//! Describes what gets written to the attestation registry for a verification
//! and the identifier the registry hands back.

use crate::models::field::{FieldCommitment, FieldType};
use crate::utils::crypto::{parse_bytes32, to_prefixed_hex};
use ethers::types::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Who vouched for the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerType {
    /// A wallet that owns an ENS name.
    Ens,
    /// A World ID proof-of-personhood.
    World,
}

impl IssuerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerType::Ens => "ens",
            IssuerType::World => "world",
        }
    }
}

/// The seven values recorded on chain for one verification.
///
/// Field order matches the registered schema; see
/// [`crate::blockchain::schema::VERIFICATION_SCHEMA`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationFields {
    /// ENS name of the verified subject, lower-cased.
    pub subject: String,
    pub field: FieldType,
    pub field_hash: FieldCommitment,
    pub issuer_type: IssuerType,
    /// Lower-cased verifier address for ENS issuers, nullifier hash for World ID.
    pub issuer_id: String,
    /// ENS name of the issuer, empty when unknown.
    pub issuer_name: String,
    /// Where the verifier documents how they checked the value. May be empty.
    pub method_url: String,
}

impl AttestationFields {
    /// Fields for a verification vouched for by an ENS-owning wallet.
    pub fn for_ens_issuer(
        subject: &str,
        field: FieldType,
        field_hash: FieldCommitment,
        issuer: Address,
        issuer_name: Option<&str>,
        method_url: Option<&str>,
    ) -> Self {
        Self {
            subject: subject.trim().to_lowercase(),
            field,
            field_hash,
            issuer_type: IssuerType::Ens,
            issuer_id: format!("0x{:x}", issuer),
            issuer_name: issuer_name.unwrap_or_default().to_string(),
            method_url: method_url.unwrap_or_default().to_string(),
        }
    }

    /// Fields for a verification backed by a World ID proof.
    pub fn for_world_issuer(
        subject: &str,
        field: FieldType,
        field_hash: FieldCommitment,
        nullifier_hash: &str,
        method_url: Option<&str>,
    ) -> Self {
        Self {
            subject: subject.trim().to_lowercase(),
            field,
            field_hash,
            issuer_type: IssuerType::World,
            issuer_id: nullifier_hash.to_string(),
            issuer_name: String::new(),
            method_url: method_url.unwrap_or_default().to_string(),
        }
    }
}

/// Opaque identifier returned by the attestation registry (an EAS UID).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttestationId([u8; 32]);

impl AttestationId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }

    /// Link to the attestation on an EAS explorer.
    pub fn explorer_url(&self, explorer_base: &str) -> String {
        format!(
            "{}/attestation/view/{}",
            explorer_base.trim_end_matches('/'),
            self.to_hex()
        )
    }
}

/// Error returned when a string is not a 32-byte hex UID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid attestation id: {0}")]
pub struct InvalidAttestationId(pub String);

impl FromStr for AttestationId {
    type Err = InvalidAttestationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes32(s)
            .map(AttestationId)
            .ok_or_else(|| InvalidAttestationId(s.to_string()))
    }
}

impl fmt::Display for AttestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for AttestationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttestationId({})", self.to_hex())
    }
}

impl Serialize for AttestationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AttestationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
