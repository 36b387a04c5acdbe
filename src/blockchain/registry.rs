// src/blockchain/registry.rs
//! Attestation registry capability.

use crate::error::RegistryError;
use crate::models::attestation::{AttestationFields, AttestationId};
use async_trait::async_trait;

/// Somewhere a verification can be recorded publicly.
///
/// Implementations encode `fields` however their registry expects and return
/// the identifier it assigned.
#[async_trait]
pub trait AttestationRegistry: Send + Sync {
    async fn submit_attestation(&self, fields: &AttestationFields) -> Result<AttestationId, RegistryError>;
}
