// src/services/verification_flow.rs
//! Verifier-side verification workflow.
//!
//! Ties the commitment, the reveal gate, the wallet and the attestation
//! registry together:
//!
//! 1. Optionally load a request and check a value through its gate
//! 2. Sign the verification with EIP-712 (ENS issuers) or carry a World ID
//!    proof (World issuers)
//! 3. Optionally write an attestation; failure here is reported, not raised
//! 4. Store the record with the API and complete the originating request
//!
//! Raw values never leave this module except to the API's `verify-value`
//! comparison of a request the verifier owns.

use crate::blockchain::registry::AttestationRegistry;
use crate::error::{RegistryError, VerifyError, VerifyResult};
use crate::models::attestation::{AttestationFields, AttestationId, IssuerType};
use crate::models::field::{FieldCommitment, FieldType};
use crate::models::verification::{
    world_signal, NewRequest, NewVerification, RequestStatus, RevealedValue, VerificationRecord,
    VerificationRequest, VerificationStats, VerificationStatus, WorldProof, WorldVerification,
};
use crate::services::api_client::ApiClient;
use crate::services::reveal::RevealGate;
use crate::utils::commitment::commit_typed_field;
use crate::wallet::connection::WalletConnection;
use crate::wallet::typed_data::VerificationMessage;
use chrono::{DateTime, TimeZone, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What the verifier is about to vouch for.
#[derive(Clone)]
pub struct VerificationDraft {
    /// ENS name of the subject.
    pub verified_ens: String,
    pub field: FieldType,
    /// Raw value; only its commitment is sent anywhere.
    pub value: String,
    pub method_url: Option<String>,
    /// Defaults to one year from signing.
    pub expires_at: Option<DateTime<Utc>>,
    /// Write an attestation as well.
    pub attest: bool,
}

impl VerificationDraft {
    pub fn new(verified_ens: &str, field: FieldType, value: &str) -> Self {
        Self {
            verified_ens: verified_ens.to_string(),
            field,
            value: value.to_string(),
            method_url: None,
            expires_at: None,
            attest: true,
        }
    }

    fn normalized_subject(&self) -> VerifyResult<String> {
        let subject = self.verified_ens.trim().to_lowercase();
        if subject.is_empty() {
            return Err(VerifyError::Validation("the subject's ENS name is required".into()));
        }
        Ok(subject)
    }

    fn method_url(&self) -> Option<&str> {
        self.method_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

impl std::fmt::Debug for VerificationDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationDraft")
            .field("verified_ens", &self.verified_ens)
            .field("field", &self.field)
            .field("value", &"<redacted>")
            .field("method_url", &self.method_url)
            .field("expires_at", &self.expires_at)
            .field("attest", &self.attest)
            .finish()
    }
}

/// A loaded request together with its gate.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: VerificationRequest,
    /// Present when the subject revealed the value to this verifier.
    pub revealed: Option<RevealedValue>,
    pub gate: RevealGate,
}

impl RequestContext {
    /// Draft for answering this request with `value`.
    pub fn draft(&self, value: &str) -> VerificationDraft {
        VerificationDraft::new(&self.request.verified_ens, self.request.field.clone(), value)
    }
}

/// Result of the attestation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AttestationOutcome {
    Created { uid: AttestationId },
    /// The record was stored without an attestation.
    Failed { error: String },
    Skipped,
}

impl AttestationOutcome {
    pub fn uid(&self) -> Option<AttestationId> {
        match self {
            AttestationOutcome::Created { uid } => Some(*uid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    pub record_id: Option<String>,
    pub field_hash: FieldCommitment,
    pub attestation: AttestationOutcome,
    pub explorer_url: Option<String>,
}

/// The verifier's requests split by state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestsOverview {
    pub pending: Vec<VerificationRequest>,
    pub completed: Vec<VerificationRequest>,
}

/// Everything known about one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub subject: String,
    pub stats: Option<VerificationStats>,
    /// Active records keyed by field id.
    pub active: BTreeMap<String, Vec<VerificationRecord>>,
    pub revoked: BTreeMap<String, Vec<VerificationRecord>>,
}

/// Runs verifications on behalf of one connected wallet.
pub struct Verifier {
    api: ApiClient,
    wallet: WalletConnection,
    registry: Option<Arc<dyn AttestationRegistry>>,
    signing_chain_id: u64,
    explorer_url: Option<String>,
}

impl Verifier {
    pub fn new(api: ApiClient, wallet: WalletConnection, signing_chain_id: u64) -> Self {
        Self {
            api,
            wallet,
            registry: None,
            signing_chain_id,
            explorer_url: None,
        }
    }

    /// Enables attestations through `registry`; `explorer_url` is the base
    /// used for attestation links.
    pub fn with_registry(mut self, registry: Arc<dyn AttestationRegistry>, explorer_url: &str) -> Self {
        self.registry = Some(registry);
        self.explorer_url = Some(explorer_url.to_string());
        self
    }

    pub fn wallet(&self) -> &WalletConnection {
        &self.wallet
    }

    pub fn attestations_enabled(&self) -> bool {
        self.registry.is_some()
    }

    /// Explorer link for `uid`, when attestations are enabled.
    pub fn explorer_url(&self, uid: AttestationId) -> Option<String> {
        self.explorer_url.as_deref().map(|base| uid.explorer_url(base))
    }

    // ---- requests ----

    /// Loads request `id` with the revealed value when the subject shared it.
    ///
    /// A revealed value is checked against the request's commitment right
    /// away; a mismatch leaves the gate closed.
    pub async fn load_request(&self, id: &str) -> VerifyResult<RequestContext> {
        let revealed = self.api.reveal_request(id, self.wallet.address()).await?;
        let request = self.api.get_request(id).await?;
        if request.verifier_address != self.wallet.address() {
            return Err(VerifyError::Validation(format!(
                "request {} belongs to another verifier",
                id
            )));
        }

        let mut gate = RevealGate::for_request(&request, revealed.is_some());
        if let Some(revealed) = &revealed {
            if revealed.field != request.field {
                warn!(
                    "request {} revealed {} but asked for {}",
                    id, revealed.field, request.field
                );
            } else if let Err(e) = gate.check(&revealed.value) {
                warn!("revealed value for request {} not accepted: {}", id, e);
            }
        }
        Ok(RequestContext {
            request,
            revealed,
            gate,
        })
    }

    /// Checks `value` against the request's commitment, locally when the
    /// request carries one and through the API otherwise.
    pub async fn check_value(&self, ctx: &mut RequestContext, value: &str) -> VerifyResult<FieldCommitment> {
        if !ctx.gate.needs_remote_check() {
            return ctx.gate.check(value);
        }
        let check = self
            .api
            .verify_value(&ctx.request.id, self.wallet.address(), value)
            .await?;
        ctx.gate.accept_remote(value, &check)
    }

    /// Asks `verified_ens` to share `field`.
    ///
    /// Only wallets with an ENS name or a Worldcoin verification may ask.
    pub async fn request_verification(&self, verified_ens: &str, field: FieldType) -> VerifyResult<VerificationRequest> {
        let subject = verified_ens.trim().to_lowercase();
        if subject.is_empty() {
            return Err(VerifyError::Validation("the subject's ENS name is required".into()));
        }
        if self.wallet.ens_name().is_none() {
            let status = self.api.worldcoin_status(self.wallet.address()).await?;
            if !status.verified {
                return Err(VerifyError::NotEligible);
            }
        }
        let request = self
            .api
            .create_request(&NewRequest {
                verifier_address: self.wallet.address(),
                verified_ens: subject,
                field,
            })
            .await?;
        info!("created request {} for {}", request.id, request.verified_ens);
        Ok(request)
    }

    pub async fn my_requests(&self) -> VerifyResult<RequestsOverview> {
        let requests = self.api.list_requests(self.wallet.address()).await?;
        let (pending, completed) = requests
            .into_iter()
            .partition(|request| request.status.is_open());
        Ok(RequestsOverview { pending, completed })
    }

    // ---- verifications ----

    /// Signs and stores an ENS-issued verification.
    ///
    /// # Errors
    /// - `ChainMismatch` if the wallet is not on the signing chain
    /// - `EnsNameRequired` if the wallet has no ENS name
    /// - `Validation` for an empty subject or value, or a draft that does
    ///   not match `request`
    /// - `ValueNotVerified`/`ValueMismatch` if `request` is given and its
    ///   gate has not accepted this value
    ///
    /// A failed attestation does not fail the call; see
    /// [`AttestationOutcome::Failed`].
    pub async fn create_verification(
        &self,
        draft: &VerificationDraft,
        request: Option<&RequestContext>,
    ) -> VerifyResult<VerificationOutcome> {
        self.wallet.ensure_chain(self.signing_chain_id)?;
        let issuer_name = self
            .wallet
            .ens_name()
            .ok_or(VerifyError::EnsNameRequired)?
            .to_string();
        let (subject, field_hash) = self.prepare(draft, request)?;

        let expires_at = VerificationMessage::expiry_timestamp(draft.expires_at, Utc::now());
        let (_, sig) = self
            .wallet
            .sign_verification(&subject, &draft.field, field_hash, draft.method_url(), expires_at)
            .await?;

        let fields = AttestationFields::for_ens_issuer(
            &subject,
            draft.field.clone(),
            field_hash,
            self.wallet.address(),
            Some(&issuer_name),
            draft.method_url(),
        );
        let attestation = self.attest_if_requested(draft.attest, &fields).await;

        let created = self
            .api
            .create_verification(&NewVerification {
                verifier_address: self.wallet.address(),
                verified_ens: subject.clone(),
                field: draft.field.clone(),
                field_hash,
                method_url: draft.method_url().map(str::to_string),
                expires_at: rfc3339(expires_at),
                sig,
                attestation_uid: attestation.uid(),
            })
            .await?;
        info!(
            "stored {} verification of {} for {}",
            draft.field, field_hash, subject
        );

        self.complete_request(request).await;
        Ok(self.outcome(created.id, field_hash, attestation))
    }

    /// Stores a verification backed by a World ID proof instead of an ENS
    /// signature.
    ///
    /// An empty proof signal is filled with the default
    /// `"<subject>:<fieldHash>"`; any other signal must equal it.
    pub async fn create_world_verification(
        &self,
        draft: &VerificationDraft,
        proof: WorldProof,
        request: Option<&RequestContext>,
    ) -> VerifyResult<VerificationOutcome> {
        let (subject, field_hash) = self.prepare(draft, request)?;
        if proof.nullifier_hash.trim().is_empty() {
            return Err(VerifyError::Validation("World ID proof has no nullifier hash".into()));
        }
        let expected_signal = world_signal(&subject, &field_hash);
        let mut proof = proof;
        if proof.signal.trim().is_empty() {
            proof.signal = expected_signal;
        } else if proof.signal != expected_signal {
            return Err(VerifyError::Validation(
                "World ID proof was generated for a different verification".into(),
            ));
        }

        let fields = AttestationFields::for_world_issuer(
            &subject,
            draft.field.clone(),
            field_hash,
            &proof.nullifier_hash,
            draft.method_url(),
        );
        let attestation = self.attest_if_requested(draft.attest, &fields).await;

        let created = self
            .api
            .create_world_verification(&WorldVerification {
                verified_ens: subject.clone(),
                field: draft.field.clone(),
                field_hash,
                world_proof: proof,
                method_url: draft.method_url().map(str::to_string),
                attestation_uid: attestation.uid(),
            })
            .await?;
        info!(
            "stored World ID {} verification of {} for {}",
            draft.field, field_hash, subject
        );

        self.complete_request(request).await;
        Ok(self.outcome(created.id, field_hash, attestation))
    }

    /// Writes an attestation for an already stored verification and links
    /// it to the record.
    pub async fn attach_attestation(&self, record: &VerificationRecord) -> VerifyResult<AttestationId> {
        let registry = self.registry.as_ref().ok_or(RegistryError::Disabled)?;
        if record.has_attestation() {
            return Err(VerifyError::Validation(format!(
                "verification {} already has an attestation",
                record.id
            )));
        }
        if record.status != VerificationStatus::Active {
            return Err(VerifyError::Validation(format!(
                "verification {} is not active",
                record.id
            )));
        }

        let fields = match record.verifier_type.unwrap_or(IssuerType::Ens) {
            IssuerType::Ens => AttestationFields::for_ens_issuer(
                &record.verified_ens,
                record.field.clone(),
                record.field_hash,
                self.wallet.address(),
                self.wallet.ens_name().or(record.ens_name.as_deref()),
                record.method_url.as_deref(),
            ),
            IssuerType::World => {
                let nullifier = record.verifier_id.as_deref().ok_or_else(|| {
                    VerifyError::Validation(format!("verification {} has no World ID nullifier", record.id))
                })?;
                AttestationFields::for_world_issuer(
                    &record.verified_ens,
                    record.field.clone(),
                    record.field_hash,
                    nullifier,
                    record.method_url.as_deref(),
                )
            }
        };

        let uid = registry.submit_attestation(&fields).await?;
        self.api
            .link_attestation(&record.id, uid, self.wallet.address())
            .await?;
        info!("linked attestation {} to verification {}", uid, record.id);
        Ok(uid)
    }

    pub async fn revoke(&self, id: &str) -> VerifyResult<()> {
        self.api
            .revoke_verification(id, self.wallet.address())
            .await?;
        info!("revoked verification {}", id);
        Ok(())
    }

    /// Verifications issued by the connected wallet.
    pub async fn my_verifications(&self) -> VerifyResult<Vec<VerificationRecord>> {
        Ok(self.api.list_by_verifier(self.wallet.address()).await?)
    }

    /// Verifications of `ens_name`, grouped by field and state.
    ///
    /// Missing stats are not an error.
    pub async fn search(&self, ens_name: &str) -> VerifyResult<SearchResult> {
        let subject = ens_name.trim().to_lowercase();
        if subject.is_empty() {
            return Err(VerifyError::Validation("an ENS name is required".into()));
        }
        let (records, stats) = tokio::join!(
            self.api.list_verifications(&subject),
            self.api.verification_stats(&subject)
        );
        let stats = stats
            .map_err(|e| warn!("no stats for {}: {}", subject, e))
            .ok();

        let mut result = SearchResult {
            subject,
            stats,
            ..Default::default()
        };
        for record in records? {
            let group = if record.status == VerificationStatus::Revoked {
                &mut result.revoked
            } else {
                &mut result.active
            };
            group
                .entry(record.field.as_str().to_string())
                .or_default()
                .push(record);
        }
        Ok(result)
    }

    // ---- helpers ----

    /// Validates `draft` against `request` and returns the normalized
    /// subject and the commitment to sign.
    fn prepare(
        &self,
        draft: &VerificationDraft,
        request: Option<&RequestContext>,
    ) -> VerifyResult<(String, FieldCommitment)> {
        let subject = draft.normalized_subject()?;
        let field_hash = commit_typed_field(&draft.field, &draft.value)
            .ok_or_else(|| VerifyError::Validation("a value is required".into()))?;

        if let Some(ctx) = request {
            if ctx.request.verified_ens.trim().to_lowercase() != subject || ctx.request.field != draft.field {
                return Err(VerifyError::Validation(format!(
                    "draft does not answer request {}",
                    ctx.request.id
                )));
            }
            if ctx.request.status != RequestStatus::Approved && ctx.request.status != RequestStatus::Pending {
                return Err(VerifyError::Validation(format!(
                    "request {} is no longer open",
                    ctx.request.id
                )));
            }
            if ctx.gate.require_verified()? != field_hash {
                return Err(VerifyError::ValueMismatch);
            }
        }
        Ok((subject, field_hash))
    }

    async fn attest_if_requested(&self, requested: bool, fields: &AttestationFields) -> AttestationOutcome {
        let registry = match (&self.registry, requested) {
            (Some(registry), true) => registry,
            _ => return AttestationOutcome::Skipped,
        };
        match registry.submit_attestation(fields).await {
            Ok(uid) => AttestationOutcome::Created { uid },
            Err(e) => {
                error!("attestation failed, storing off-chain only: {}", e);
                AttestationOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn complete_request(&self, request: Option<&RequestContext>) {
        if let Some(ctx) = request {
            if let Err(e) = self
                .api
                .complete_request(&ctx.request.id, self.wallet.address())
                .await
            {
                warn!("could not complete request {}: {}", ctx.request.id, e);
            }
        }
    }

    fn outcome(
        &self,
        record_id: Option<String>,
        field_hash: FieldCommitment,
        attestation: AttestationOutcome,
    ) -> VerificationOutcome {
        let explorer_url = attestation.uid().and_then(|uid| self.explorer_url(uid));
        VerificationOutcome {
            record_id,
            field_hash,
            attestation,
            explorer_url,
        }
    }
}

fn rfc3339(unix_seconds: u64) -> Option<String> {
    Utc.timestamp_opt(unix_seconds as i64, 0)
        .single()
        .map(|at| at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::verification::RevealMode;
    use crate::services::reveal::RevealState;
    use crate::utils::commitment::commit_field;
    use crate::wallet::key_management::KeyManager;
    use async_trait::async_trait;
    use ethers::types::Address;
    use k256::ecdsa::SigningKey;
    use mockito::{mock, Matcher};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    const CHAIN: u64 = 11_155_111;

    /// Registry double recording what it was asked to attest.
    #[derive(Default)]
    struct RecordingRegistry {
        fail: bool,
        seen: Mutex<Vec<AttestationFields>>,
    }

    #[async_trait]
    impl AttestationRegistry for RecordingRegistry {
        async fn submit_attestation(&self, fields: &AttestationFields) -> Result<AttestationId, RegistryError> {
            self.seen.lock().unwrap().push(fields.clone());
            if self.fail {
                Err(RegistryError::Contract("execution reverted".into()))
            } else {
                Ok(AttestationId::from_bytes([0x77; 32]))
            }
        }
    }

    fn wallet(chain_id: u64, ens: Option<&str>) -> WalletConnection {
        let keys = KeyManager::from_signing_key(SigningKey::random(&mut rand::thread_rng()));
        WalletConnection::new(Arc::new(keys), chain_id).with_ens_name(ens.map(str::to_string))
    }

    fn verifier(wallet: WalletConnection) -> Verifier {
        let api = ApiClient::new(&mockito::server_url(), Duration::from_secs(5)).unwrap();
        Verifier::new(api, wallet, CHAIN)
    }

    fn request_ctx(id: &str, verifier: Address, stored: Option<FieldCommitment>) -> RequestContext {
        let request = VerificationRequest {
            id: id.into(),
            verifier_address: verifier,
            verifier_ens: None,
            verified_ens: "alice.eth".into(),
            field: FieldType::FullName,
            status: RequestStatus::Approved,
            reveal_mode: Some(RevealMode::NoReveal),
            field_hash: stored,
            requested_at: None,
            approved_at: None,
            expires_at: None,
            completed_at: None,
        };
        let gate = RevealGate::new(RevealState::CommitmentOnly, FieldType::FullName, stored);
        RequestContext {
            request,
            revealed: None,
            gate,
        }
    }

    #[tokio::test]
    async fn test_ens_name_required_before_anything_is_sent() {
        let verifier = verifier(wallet(CHAIN, None));
        let draft = VerificationDraft::new("alice.eth", FieldType::FullName, "Alice Smith");
        let err = verifier.create_verification(&draft, None).await.unwrap_err();
        assert!(matches!(err, VerifyError::EnsNameRequired));
    }

    #[tokio::test]
    async fn test_wrong_chain_is_rejected() {
        let verifier = verifier(wallet(1, Some("bob.eth")));
        let draft = VerificationDraft::new("alice.eth", FieldType::FullName, "Alice Smith");
        let err = verifier.create_verification(&draft, None).await.unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Wallet(crate::error::WalletError::ChainMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_value_is_rejected() {
        let verifier = verifier(wallet(CHAIN, Some("bob.eth")));
        let draft = VerificationDraft::new("alice.eth", FieldType::FullName, "   ");
        let err = verifier.create_verification(&draft, None).await.unwrap_err();
        assert!(matches!(err, VerifyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unchecked_request_blocks_signing() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let ctx = request_ctx("req-gate", wallet.address(), commit_field("full_name", "Alice Smith"));
        let verifier = verifier(wallet);
        let draft = ctx.draft("Alice Smith");
        let err = verifier.create_verification(&draft, Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, VerifyError::ValueNotVerified));
    }

    #[tokio::test]
    async fn test_checked_value_must_be_the_signed_value() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let mut ctx = request_ctx("req-swap", wallet.address(), commit_field("full_name", "Alice Smith"));
        let verifier = verifier(wallet);
        verifier.check_value(&mut ctx, "alice smith").await.unwrap();

        let mut draft = ctx.draft("Alice Smyth");
        let err = verifier.create_verification(&draft, Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, VerifyError::ValueMismatch));

        draft.verified_ens = "mallory.eth".into();
        let err = verifier.create_verification(&draft, Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, VerifyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_with_attestation_and_request_completion() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let address = wallet.address();
        let hash = commit_field("full_name", "Alice Smith").unwrap();
        let mut ctx = request_ctx("req-ok", address, Some(hash));

        let registry = Arc::new(RecordingRegistry::default());
        let verifier = verifier(wallet).with_registry(registry.clone(), "https://base-sepolia.easscan.org");
        verifier.check_value(&mut ctx, " Alice Smith ").await.unwrap();

        let create = mock("POST", "/api/verifications")
            .match_body(Matcher::PartialJson(json!({
                "verifiedEns": "alice.eth",
                "field": "full_name",
                "fieldHash": hash.to_hex(),
                "verifierAddress": format!("0x{:x}", address),
                "attestationUid": format!("0x{}", "77".repeat(32)),
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"ver-1"}"#)
            .create();
        let complete = mock("POST", "/api/requests/req-ok/complete")
            .with_status(200)
            .with_body("{}")
            .create();

        let mut draft = ctx.draft("Alice Smith");
        draft.method_url = Some("https://example.org/kyc".into());
        let outcome = verifier.create_verification(&draft, Some(&ctx)).await.unwrap();

        create.assert();
        complete.assert();
        assert_eq!(outcome.record_id.as_deref(), Some("ver-1"));
        assert_eq!(outcome.field_hash, hash);
        assert_eq!(
            outcome.attestation,
            AttestationOutcome::Created {
                uid: AttestationId::from_bytes([0x77; 32])
            }
        );
        assert!(outcome
            .explorer_url
            .unwrap()
            .starts_with("https://base-sepolia.easscan.org/attestation/view/0x7777"));

        let seen = registry.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].issuer_type, IssuerType::Ens);
        assert_eq!(seen[0].issuer_name, "bob.eth");
        assert_eq!(seen[0].issuer_id, format!("0x{:x}", address));
        assert_eq!(seen[0].method_url, "https://example.org/kyc");
    }

    #[tokio::test]
    async fn test_attestation_failure_still_stores_record() {
        let verifier = verifier(wallet(CHAIN, Some("bob.eth"))).with_registry(
            Arc::new(RecordingRegistry {
                fail: true,
                ..Default::default()
            }),
            "https://base-sepolia.easscan.org",
        );
        let create = mock("POST", "/api/verifications")
            .match_body(Matcher::PartialJson(json!({ "verifiedEns": "carol.eth" })))
            .with_status(201)
            .with_body(r#"{"id":"ver-2"}"#)
            .create();

        let draft = VerificationDraft::new("Carol.eth", FieldType::DateOfBirth, "1990-01-01");
        let outcome = verifier.create_verification(&draft, None).await.unwrap();

        create.assert();
        assert!(matches!(outcome.attestation, AttestationOutcome::Failed { .. }));
        assert_eq!(outcome.explorer_url, None);
    }

    #[tokio::test]
    async fn test_world_verification_fills_signal() {
        let registry = Arc::new(RecordingRegistry::default());
        let verifier = verifier(wallet(CHAIN, None)).with_registry(registry.clone(), "https://x");
        let hash = commit_field("passport_id", "X1234567").unwrap();
        let create = mock("POST", "/verify/world")
            .match_body(Matcher::PartialJson(json!({
                "verifiedEns": "dave.eth",
                "worldProof": { "signal": format!("dave.eth:{}", hash.to_hex()) },
            })))
            .with_status(201)
            .with_body(r#"{"id":"ver-3"}"#)
            .create();

        let draft = VerificationDraft::new("dave.eth", FieldType::PassportId, "X1234567");
        let proof = WorldProof {
            merkle_root: "0x01".into(),
            nullifier_hash: "0xnull".into(),
            proof: "0x02".into(),
            signal: String::new(),
        };
        let outcome = verifier.create_world_verification(&draft, proof, None).await.unwrap();
        create.assert();
        assert_eq!(outcome.record_id.as_deref(), Some("ver-3"));
        let seen = registry.seen.lock().unwrap();
        assert_eq!(seen[0].issuer_type, IssuerType::World);
        assert_eq!(seen[0].issuer_id, "0xnull");
    }

    #[tokio::test]
    async fn test_world_verification_rejects_foreign_signal() {
        let verifier = verifier(wallet(CHAIN, None));
        let draft = VerificationDraft::new("dave.eth", FieldType::PassportId, "X1234567");
        let proof = WorldProof {
            merkle_root: "0x01".into(),
            nullifier_hash: "0xnull".into(),
            proof: "0x02".into(),
            signal: "erin.eth:0x00".into(),
        };
        let err = verifier
            .create_world_verification(&draft, proof, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::Validation(_)));
    }

    #[tokio::test]
    async fn test_attach_attestation_requires_registry() {
        let verifier = verifier(wallet(CHAIN, Some("bob.eth")));
        let record: VerificationRecord = serde_json::from_value(json!({
            "id": "ver-9",
            "verifiedEns": "alice.eth",
            "field": "full_name",
            "fieldHash": format!("0x{}", "12".repeat(32)),
            "status": "active"
        }))
        .unwrap();
        let err = verifier.attach_attestation(&record).await.unwrap_err();
        assert!(matches!(err, VerifyError::Registry(RegistryError::Disabled)));
    }

    #[tokio::test]
    async fn test_request_without_ens_needs_worldcoin() {
        let wallet = wallet(CHAIN, None);
        let path = format!("/api/worldcoin/0x{:x}", wallet.address());
        let verifier = verifier(wallet);
        let status = mock("GET", path.as_str())
            .with_status(200)
            .with_body(r#"{"verified":false}"#)
            .create();
        let err = verifier
            .request_verification("alice.eth", FieldType::DateOfBirth)
            .await
            .unwrap_err();
        status.assert();
        assert!(matches!(err, VerifyError::NotEligible));
    }

    #[tokio::test]
    async fn test_search_groups_by_state_and_field() {
        let verifier = verifier(wallet(CHAIN, None));
        let hash = format!("0x{}", "ab".repeat(32));
        let _records = mock("GET", "/api/verifications/frank.eth")
            .with_status(200)
            .with_body(
                json!([
                    { "id": "1", "verifiedEns": "frank.eth", "field": "full_name", "fieldHash": hash, "status": "active" },
                    { "id": "2", "verifiedEns": "frank.eth", "field": "full_name", "fieldHash": hash, "status": "revoked" },
                    { "id": "3", "verifiedEns": "frank.eth", "field": "dob", "fieldHash": hash, "status": "active" }
                ])
                .to_string(),
            )
            .create();
        let _stats = mock("GET", "/api/verifications/frank.eth/stats")
            .with_status(500)
            .with_body(r#"{"error":"boom"}"#)
            .create();

        let result = verifier.search(" Frank.eth ").await.unwrap();
        assert_eq!(result.subject, "frank.eth");
        assert!(result.stats.is_none());
        assert_eq!(result.active["full_name"].len(), 1);
        assert_eq!(result.active["dob"].len(), 1);
        assert_eq!(result.revoked["full_name"][0].id, "2");
    }

    #[tokio::test]
    async fn test_load_request_checks_revealed_value() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let address = format!("0x{:x}", wallet.address());
        let hash = commit_field("full_name", "Alice Smith").unwrap();
        let verifier = verifier(wallet);
        let _reveal = mock("GET", Matcher::Regex(r"^/api/requests/req-reveal/reveal".into()))
            .with_status(200)
            .with_body(json!({ "verifiedEns": "alice.eth", "field": "full_name", "value": "Alice Smith" }).to_string())
            .create();
        let _request = mock("GET", "/api/requests/id/req-reveal")
            .with_status(200)
            .with_body(
                json!({
                    "id": "req-reveal",
                    "verifierAddress": address,
                    "verifiedEns": "alice.eth",
                    "field": "full_name",
                    "status": "approved",
                    "revealMode": "reveal",
                    "fieldHash": hash.to_hex()
                })
                .to_string(),
            )
            .create();

        let ctx = verifier.load_request("req-reveal").await.unwrap();
        assert_eq!(ctx.gate.state(), RevealState::Disclosed);
        assert_eq!(ctx.gate.require_verified().unwrap(), hash);
        assert!(ctx.revealed.is_some());
    }

    #[tokio::test]
    async fn test_load_request_keeps_gate_closed_on_wrong_reveal() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let address = format!("0x{:x}", wallet.address());
        let hash = commit_field("full_name", "Alice Smith").unwrap();
        let verifier = verifier(wallet);
        let _reveal = mock("GET", Matcher::Regex(r"^/api/requests/req-wrong-reveal/reveal".into()))
            .with_status(200)
            .with_body(json!({ "verifiedEns": "alice.eth", "field": "full_name", "value": "Alice Smyth" }).to_string())
            .create();
        let _request = mock("GET", "/api/requests/id/req-wrong-reveal")
            .with_status(200)
            .with_body(
                json!({
                    "id": "req-wrong-reveal",
                    "verifierAddress": address,
                    "verifiedEns": "alice.eth",
                    "field": "full_name",
                    "status": "approved",
                    "revealMode": "reveal",
                    "fieldHash": hash.to_hex()
                })
                .to_string(),
            )
            .create();

        let ctx = verifier.load_request("req-wrong-reveal").await.unwrap();
        assert_eq!(ctx.gate.state(), RevealState::Disclosed);
        assert!(ctx.revealed.is_some());
        assert!(!ctx.gate.is_verified());
        assert!(matches!(ctx.gate.require_verified(), Err(VerifyError::ValueNotVerified)));

        let draft = ctx.draft("Alice Smyth");
        let err = verifier.create_verification(&draft, Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, VerifyError::ValueNotVerified));
    }

    #[tokio::test]
    async fn test_check_value_asks_api_without_local_commitment() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let address = wallet.address();
        let hash = commit_field("full_name", "Alice Smith").unwrap();
        let mut ctx = request_ctx("req-remote", address, None);
        let verifier = verifier(wallet);
        let check = mock("POST", "/api/requests/req-remote/verify-value")
            .match_body(Matcher::Json(json!({
                "verifierAddress": format!("0x{:x}", address),
                "typedValue": "Alice Smith",
            })))
            .with_status(200)
            .with_body(json!({ "matches": true, "fieldHash": hash.to_hex() }).to_string())
            .create();

        assert!(ctx.gate.needs_remote_check());
        let checked = verifier.check_value(&mut ctx, "Alice Smith").await.unwrap();
        check.assert();
        assert_eq!(checked, hash);
        assert_eq!(ctx.gate.require_verified().unwrap(), hash);
        assert_eq!(ctx.gate.stored_commitment(), Some(hash));
    }

    #[tokio::test]
    async fn test_check_value_api_mismatch_keeps_gate_closed() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let mut ctx = request_ctx("req-remote-no", wallet.address(), None);
        let verifier = verifier(wallet);
        let check = mock("POST", "/api/requests/req-remote-no/verify-value")
            .with_status(200)
            .with_body(r#"{"matches":false}"#)
            .create();

        let err = verifier.check_value(&mut ctx, "Alice Smyth").await.unwrap_err();
        check.assert();
        assert!(matches!(err, VerifyError::ValueMismatch));
        assert!(!ctx.gate.is_verified());
    }

    #[tokio::test]
    async fn test_attach_attestation_links_uid() {
        let wallet = wallet(CHAIN, Some("bob.eth"));
        let address = wallet.address();
        let registry = Arc::new(RecordingRegistry::default());
        let verifier = verifier(wallet).with_registry(registry.clone(), "https://base-sepolia.easscan.org");
        let record: VerificationRecord = serde_json::from_value(json!({
            "id": "ver-late",
            "verifiedEns": "alice.eth",
            "field": "dob",
            "fieldHash": format!("0x{}", "12".repeat(32)),
            "verifierType": "ens",
            "verifierId": format!("0x{:x}", address),
            "methodUrl": "https://example.org/kyc",
            "status": "active"
        }))
        .unwrap();
        let link = mock("POST", "/api/verifications/ver-late/attestation")
            .match_body(Matcher::Json(json!({
                "attestationUid": format!("0x{}", "77".repeat(32)),
                "verifierAddress": format!("0x{:x}", address),
            })))
            .with_status(200)
            .with_body("{}")
            .create();

        let uid = verifier.attach_attestation(&record).await.unwrap();
        link.assert();
        assert_eq!(uid, AttestationId::from_bytes([0x77; 32]));

        let seen = registry.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].subject, "alice.eth");
        assert_eq!(seen[0].field, FieldType::DateOfBirth);
        assert_eq!(seen[0].field_hash, FieldCommitment::from_bytes([0x12; 32]));
        assert_eq!(seen[0].issuer_name, "bob.eth");
        assert_eq!(seen[0].method_url, "https://example.org/kyc");
    }
}
