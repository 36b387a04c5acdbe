// src/models/field.rs
//! Field types and field commitments.
//!
//! A field is one piece of personal data a subject can have verified (their
//! full name, date of birth, passport number). The value itself never leaves
//! the verifier; only its [`FieldCommitment`] is shared with the API and
//! written on chain.

use crate::utils::crypto::{parse_bytes32, to_prefixed_hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Kind of personal field being verified.
///
/// The three built-in kinds match the identifiers used by the VerifyENS API.
/// Any other non-empty identifier is carried as [`FieldType::Custom`] so new
/// field kinds do not require a release of this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `full_name`
    FullName,
    /// `dob`
    DateOfBirth,
    /// `passport_id`
    PassportId,
    /// Any other field identifier
    Custom(String),
}

impl FieldType {
    /// Wire identifier folded into the commitment and sent to the API.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::FullName => "full_name",
            FieldType::DateOfBirth => "dob",
            FieldType::PassportId => "passport_id",
            FieldType::Custom(id) => id.as_str(),
        }
    }
}

/// Error returned when parsing a field identifier that is empty or carries
/// surrounding whitespace. The id is folded into commitments as-is, so only
/// the canonical form is accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field type {0:?}")]
pub struct InvalidFieldType(pub String);

impl FromStr for FieldType {
    type Err = InvalidFieldType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.trim() != s {
            return Err(InvalidFieldType(s.to_string()));
        }
        match s {
            "full_name" => Ok(FieldType::FullName),
            "dob" => Ok(FieldType::DateOfBirth),
            "passport_id" => Ok(FieldType::PassportId),
            other => Ok(FieldType::Custom(other.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A 32-byte commitment to a field value.
///
/// Safe to disclose: it is a one-way digest of the normalized value. Compared
/// on the full digest, never a prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldCommitment([u8; 32]);

impl FieldCommitment {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x` followed by 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        to_prefixed_hex(&self.0)
    }
}

/// Error returned when a string is not a 32-byte hex value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid field commitment: {0}")]
pub struct InvalidCommitment(pub String);

impl FromStr for FieldCommitment {
    type Err = InvalidCommitment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_bytes32(s)
            .map(FieldCommitment)
            .ok_or_else(|| InvalidCommitment(s.to_string()))
    }
}

impl fmt::Display for FieldCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FieldCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldCommitment({})", self.to_hex())
    }
}

impl From<[u8; 32]> for FieldCommitment {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for FieldCommitment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FieldCommitment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
