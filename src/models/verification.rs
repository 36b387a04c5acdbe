// src/models/verification.rs
//! Verification records and verification requests.
//!
//! These mirror the JSON documents exchanged with the VerifyENS API. The API
//! owns their lifecycle; this crate only creates, reads and updates them
//! through [`crate::services::api_client::ApiClient`].
//!
//! Wire names are camelCase. The API has used both `valueHash` and
//! `fieldHash` for the commitment and both `issuedAt` and `createdAt` for the
//! creation time, sometimes in the same document. Either spelling is
//! accepted when reading, `fieldHash`/`createdAt` winning when both are
//! present.

use crate::models::attestation::{AttestationId, IssuerType};
use crate::models::field::{FieldCommitment, FieldType};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle state of a stored verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Active,
    Revoked,
    #[serde(other)]
    Unknown,
}

/// A verification as stored by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireRecord")]
pub struct VerificationRecord {
    pub id: String,
    /// ENS name of the subject.
    pub verified_ens: String,
    pub field: FieldType,
    pub field_hash: FieldCommitment,
    pub verifier_type: Option<IssuerType>,
    pub verifier_id: Option<String>,
    pub ens_name: Option<String>,
    pub method_url: Option<String>,
    pub created_at: Option<String>,
    pub expires_at: Option<String>,
    pub status: VerificationStatus,
    pub attestation_uid: Option<AttestationId>,
    pub attestation_explorer_url: Option<String>,
    pub is_valid: Option<bool>,
    pub is_expired: Option<bool>,
    pub is_ens_valid: Option<bool>,
}

/// [`VerificationRecord`] as sent, with each spelling in its own slot.
/// Some endpoints send both.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRecord {
    id: String,
    verified_ens: String,
    field: FieldType,
    #[serde(default)]
    field_hash: Option<FieldCommitment>,
    #[serde(default)]
    value_hash: Option<FieldCommitment>,
    #[serde(default)]
    verifier_type: Option<IssuerType>,
    #[serde(default)]
    verifier_id: Option<String>,
    #[serde(default)]
    ens_name: Option<String>,
    #[serde(default)]
    method_url: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    issued_at: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    status: VerificationStatus,
    #[serde(default)]
    attestation_uid: Option<AttestationId>,
    #[serde(default)]
    attestation_explorer_url: Option<String>,
    #[serde(default)]
    is_valid: Option<bool>,
    #[serde(default)]
    is_expired: Option<bool>,
    #[serde(default)]
    is_ens_valid: Option<bool>,
}

impl TryFrom<WireRecord> for VerificationRecord {
    type Error = String;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        let field_hash = wire
            .field_hash
            .or(wire.value_hash)
            .ok_or_else(|| format!("verification {} has no fieldHash", wire.id))?;
        Ok(Self {
            id: wire.id,
            verified_ens: wire.verified_ens,
            field: wire.field,
            field_hash,
            verifier_type: wire.verifier_type,
            verifier_id: wire.verifier_id,
            ens_name: wire.ens_name,
            method_url: wire.method_url,
            created_at: wire.created_at.or(wire.issued_at),
            expires_at: wire.expires_at,
            status: wire.status,
            attestation_uid: wire.attestation_uid,
            attestation_explorer_url: wire.attestation_explorer_url,
            is_valid: wire.is_valid,
            is_expired: wire.is_expired,
            is_ens_valid: wire.is_ens_valid,
        })
    }
}

impl VerificationRecord {
    /// Active and not flagged invalid by the API.
    pub fn is_currently_valid(&self) -> bool {
        self.status == VerificationStatus::Active && self.is_valid.unwrap_or(true)
    }

    pub fn has_attestation(&self) -> bool {
        self.attestation_uid.is_some()
    }
}

/// Payload for `POST /api/verifications` (ENS issuer path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVerification {
    pub verifier_address: Address,
    pub verified_ens: String,
    pub field: FieldType,
    pub field_hash: FieldCommitment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_url: Option<String>,
    /// RFC 3339 expiry as entered by the verifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// `0x`-hex EIP-712 signature over the verification.
    pub sig: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_uid: Option<AttestationId>,
}

/// World ID proof as produced by the IDKit widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldProof {
    pub merkle_root: String,
    pub nullifier_hash: String,
    pub proof: String,
    pub signal: String,
}

/// Payload for `POST /verify/world`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldVerification {
    pub verified_ens: String,
    pub field: FieldType,
    pub field_hash: FieldCommitment,
    pub world_proof: WorldProof,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation_uid: Option<AttestationId>,
}

/// Signal bound into a World ID proof for a verification.
pub fn world_signal(verified_ens: &str, field_hash: &FieldCommitment) -> String {
    format!("{}:{}", verified_ens, field_hash)
}

/// Created record, as echoed back by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedVerification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attestation_uid: Option<AttestationId>,
}

/// State of a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Completed,
    Rejected,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RequestStatus {
    /// Still waiting on the subject or the verifier.
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }
}

/// How the subject chose to answer a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RevealMode {
    /// The subject disclosed the raw value to the verifier.
    #[serde(rename = "reveal")]
    Reveal,
    /// Only the subject's commitment is available; the verifier must supply
    /// the value themselves and have it compared.
    #[default]
    #[serde(rename = "no-reveal")]
    NoReveal,
}

/// A request from a verifier to a subject for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireRequest")]
pub struct VerificationRequest {
    pub id: String,
    pub verifier_address: Address,
    pub verifier_ens: Option<String>,
    pub verified_ens: String,
    pub field: FieldType,
    pub status: RequestStatus,
    pub reveal_mode: Option<RevealMode>,
    /// Commitment the subject made to their own value, when shared.
    pub field_hash: Option<FieldCommitment>,
    pub requested_at: Option<String>,
    pub approved_at: Option<String>,
    pub expires_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest {
    id: String,
    verifier_address: Address,
    #[serde(default)]
    verifier_ens: Option<String>,
    verified_ens: String,
    field: FieldType,
    status: RequestStatus,
    #[serde(default)]
    reveal_mode: Option<RevealMode>,
    #[serde(default)]
    field_hash: Option<FieldCommitment>,
    #[serde(default)]
    value_hash: Option<FieldCommitment>,
    #[serde(default)]
    requested_at: Option<String>,
    #[serde(default)]
    approved_at: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    completed_at: Option<String>,
}

impl From<WireRequest> for VerificationRequest {
    fn from(wire: WireRequest) -> Self {
        Self {
            id: wire.id,
            verifier_address: wire.verifier_address,
            verifier_ens: wire.verifier_ens,
            verified_ens: wire.verified_ens,
            field: wire.field,
            status: wire.status,
            reveal_mode: wire.reveal_mode,
            field_hash: wire.field_hash.or(wire.value_hash),
            requested_at: wire.requested_at,
            approved_at: wire.approved_at,
            expires_at: wire.expires_at,
            completed_at: wire.completed_at,
        }
    }
}

impl VerificationRequest {
    pub fn reveal_mode(&self) -> RevealMode {
        self.reveal_mode.unwrap_or_default()
    }
}

/// Payload for `POST /api/requests`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub verifier_address: Address,
    pub verified_ens: String,
    pub field: FieldType,
}

/// Value disclosed to the verifier of a request in reveal mode.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealedValue {
    pub verified_ens: String,
    pub field: FieldType,
    pub value: String,
}

impl std::fmt::Debug for RevealedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevealedValue")
            .field("verified_ens", &self.verified_ens)
            .field("field", &self.field)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Body for `POST /api/requests/{id}/verify-value`.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyValueBody<'a> {
    pub verifier_address: Address,
    pub typed_value: &'a str,
}

/// Response of `POST /api/requests/{id}/verify-value`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueCheck {
    pub matches: bool,
    #[serde(default)]
    pub field_hash: Option<FieldCommitment>,
}

/// Body carrying only the acting verifier.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierBody {
    pub verifier_address: Address,
}

/// Body for `POST /api/verifications/{id}/attestation`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkAttestationBody {
    pub attestation_uid: AttestationId,
    pub verifier_address: Address,
}

/// Response of `GET /api/worldcoin/{address}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct WorldcoinStatus {
    #[serde(default)]
    pub verified: bool,
}

/// One verifier entry in [`VerificationStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifierSummary {
    pub verifier_type: IssuerType,
    pub verifier_id: String,
    #[serde(default)]
    pub ens_name: Option<String>,
    pub verified_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    pub count: u64,
    #[serde(default)]
    pub verifiers: Vec<VerifierSummary>,
}

/// Aggregate view of everything verified for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStats {
    pub subject_ens: String,
    pub total_fields: u64,
    pub total_verifiers: u64,
    pub ens_verifiers: u64,
    pub world_verifiers: u64,
    #[serde(default)]
    pub by_field: BTreeMap<String, FieldStats>,
}

/// Error document returned by the API on failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub error: String,
}
