// src/services/reveal.rs
//! Reveal gate for answering a verification request.
//!
//! A subject answers a request either by disclosing the value to the
//! verifier or by sharing only their commitment. Either way the verifier may
//! not sign or attest until a value has been checked against what the
//! subject committed to. The gate is per-request state owned by the caller.

use crate::error::{VerifyError, VerifyResult};
use crate::models::field::{FieldCommitment, FieldType};
use crate::models::verification::{RevealMode, ValueCheck, VerificationRequest};
use crate::utils::commitment::{commit_typed_field, matches_commitment};
use log::{debug, warn};

/// How the subject answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    /// The raw value was disclosed to the verifier.
    Disclosed,
    /// Only a commitment is available; the verifier supplies the value.
    CommitmentOnly,
}

impl From<RevealMode> for RevealState {
    fn from(mode: RevealMode) -> Self {
        match mode {
            RevealMode::Reveal => RevealState::Disclosed,
            RevealMode::NoReveal => RevealState::CommitmentOnly,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevealGate {
    state: RevealState,
    field: FieldType,
    stored: Option<FieldCommitment>,
    verified: Option<FieldCommitment>,
}

impl RevealGate {
    pub fn new(state: RevealState, field: FieldType, stored: Option<FieldCommitment>) -> Self {
        Self {
            state,
            field,
            stored,
            verified: None,
        }
    }

    /// Gate for `request`; `disclosed` is whether the reveal endpoint
    /// returned a value.
    pub fn for_request(request: &VerificationRequest, disclosed: bool) -> Self {
        let state = if disclosed {
            RevealState::Disclosed
        } else {
            RevealState::from(request.reveal_mode())
        };
        Self::new(state, request.field.clone(), request.field_hash)
    }

    pub fn state(&self) -> RevealState {
        self.state
    }

    pub fn field(&self) -> &FieldType {
        &self.field
    }

    pub fn stored_commitment(&self) -> Option<FieldCommitment> {
        self.stored
    }

    /// No commitment to compare with locally, so the API has to do it.
    pub fn needs_remote_check(&self) -> bool {
        self.stored.is_none() && self.state == RevealState::CommitmentOnly
    }

    /// Checks `value` against the stored commitment.
    ///
    /// With no stored commitment a disclosed value is accepted as the
    /// subject's own; a commitment-only gate fails with `ValueNotVerified`
    /// and must go through [`RevealGate::accept_remote`].
    pub fn check(&mut self, value: &str) -> VerifyResult<FieldCommitment> {
        let computed = self.commit(value)?;
        match self.stored {
            Some(stored) if matches_commitment(self.field.as_str(), value, &stored) => {
                debug!("value matches stored commitment {}", stored);
                self.verified = Some(computed);
                Ok(computed)
            }
            Some(stored) => {
                warn!("value does not match stored commitment {}", stored);
                self.verified = None;
                Err(VerifyError::ValueMismatch)
            }
            None if self.state == RevealState::Disclosed => {
                self.verified = Some(computed);
                Ok(computed)
            }
            None => Err(VerifyError::ValueNotVerified),
        }
    }

    /// Applies the API's comparison of `value`.
    ///
    /// Accepted only when the API reports a match and the hash it reports is
    /// the one recomputed here, so a wrong or stale API answer cannot verify
    /// a different value.
    pub fn accept_remote(&mut self, value: &str, check: &ValueCheck) -> VerifyResult<FieldCommitment> {
        let computed = self.commit(value)?;
        if !check.matches {
            self.verified = None;
            return Err(VerifyError::ValueMismatch);
        }
        match check.field_hash {
            Some(reported) if reported == computed => {
                self.stored = Some(reported);
                self.verified = Some(computed);
                Ok(computed)
            }
            Some(reported) => {
                warn!(
                    "API reported commitment {} but value commits to {}",
                    reported, computed
                );
                self.verified = None;
                Err(VerifyError::ValueMismatch)
            }
            None => {
                self.verified = None;
                Err(VerifyError::ValueNotVerified)
            }
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verified.is_some()
    }

    /// The checked commitment; fails with `ValueNotVerified` until a check
    /// succeeded.
    pub fn require_verified(&self) -> VerifyResult<FieldCommitment> {
        self.verified.ok_or(VerifyError::ValueNotVerified)
    }

    fn commit(&self, value: &str) -> VerifyResult<FieldCommitment> {
        commit_typed_field(&self.field, value)
            .ok_or_else(|| VerifyError::Validation("a value is required".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::commitment::commit_field;

    fn gate(state: RevealState, stored: Option<FieldCommitment>) -> RevealGate {
        RevealGate::new(state, FieldType::FullName, stored)
    }

    #[test]
    fn test_commitment_only_blocks_until_checked() {
        let stored = commit_field("full_name", "Alice Smith");
        let mut gate = gate(RevealState::CommitmentOnly, stored);
        assert!(matches!(gate.require_verified(), Err(VerifyError::ValueNotVerified)));

        assert!(matches!(gate.check("Alice Smyth"), Err(VerifyError::ValueMismatch)));
        assert!(!gate.is_verified());

        let checked = gate.check("  ALICE SMITH ").unwrap();
        assert_eq!(Some(checked), stored);
        assert_eq!(gate.require_verified().unwrap(), checked);
    }

    #[test]
    fn test_pasted_value_with_bom_matches() {
        let mut gate = gate(RevealState::CommitmentOnly, commit_field("full_name", "Alice Smith"));
        assert!(gate.check("\u{FEFF}Alice Smith").is_ok());
        assert!(matches!(gate.check("\u{85}Alice Smith"), Err(VerifyError::ValueMismatch)));
    }

    #[test]
    fn test_failed_recheck_clears_verification() {
        let mut gate = gate(RevealState::CommitmentOnly, commit_field("full_name", "Alice Smith"));
        gate.check("alice smith").unwrap();
        assert!(gate.check("bob").is_err());
        assert!(gate.require_verified().is_err());
    }

    #[test]
    fn test_disclosed_without_commitment_accepts_value() {
        let mut gate = gate(RevealState::Disclosed, None);
        assert!(!gate.needs_remote_check());
        let checked = gate.check("Alice Smith").unwrap();
        assert_eq!(Some(checked), commit_field("full_name", "alice smith"));
    }

    #[test]
    fn test_commitment_only_without_commitment_needs_api() {
        let mut gate = gate(RevealState::CommitmentOnly, None);
        assert!(gate.needs_remote_check());
        assert!(matches!(gate.check("Alice Smith"), Err(VerifyError::ValueNotVerified)));
    }

    #[test]
    fn test_empty_value_is_a_validation_error() {
        let mut gate = gate(RevealState::Disclosed, None);
        assert!(matches!(gate.check("   "), Err(VerifyError::Validation(_))));
    }

    #[test]
    fn test_remote_match_requires_same_hash() {
        let own = commit_field("full_name", "Alice Smith");
        let mut gate = gate(RevealState::CommitmentOnly, None);

        let wrong = ValueCheck {
            matches: true,
            field_hash: commit_field("dob", "Alice Smith"),
        };
        assert!(matches!(gate.accept_remote("Alice Smith", &wrong), Err(VerifyError::ValueMismatch)));

        let missing = ValueCheck {
            matches: true,
            field_hash: None,
        };
        assert!(gate.accept_remote("Alice Smith", &missing).is_err());

        let rejected = ValueCheck {
            matches: false,
            field_hash: own,
        };
        assert!(matches!(gate.accept_remote("Alice Smith", &rejected), Err(VerifyError::ValueMismatch)));

        let good = ValueCheck {
            matches: true,
            field_hash: own,
        };
        assert_eq!(Some(gate.accept_remote("Alice Smith", &good).unwrap()), own);
        assert_eq!(gate.stored_commitment(), own);
        assert!(!gate.needs_remote_check());
    }

    #[test]
    fn test_gate_from_request() {
        let request: VerificationRequest = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "verifierAddress": "0x00000000000000000000000000000000000000aa",
            "verifiedEns": "alice.eth",
            "field": "dob",
            "status": "approved",
            "revealMode": "reveal"
        }))
        .unwrap();
        let gate = RevealGate::for_request(&request, false);
        assert_eq!(gate.state(), RevealState::Disclosed);
        assert_eq!(gate.field(), &FieldType::DateOfBirth);

        let mut plain = request.clone();
        plain.reveal_mode = None;
        assert_eq!(RevealGate::for_request(&plain, false).state(), RevealState::CommitmentOnly);
        assert_eq!(RevealGate::for_request(&plain, true).state(), RevealState::Disclosed);
    }
}
