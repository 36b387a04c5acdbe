// src/services/api_client.rs
//! Client for the VerifyENS REST API.
//!
//! The API stores verification records and verification requests. This
//! client only ever sends it commitments; raw field values go out solely to
//! the `verify-value` comparison endpoint of a request the verifier owns.
//!
//! Reads are retried on transport failures (see [`crate::services::retry`]).
//! Writes are sent once.

use crate::config::Settings;
use crate::error::ApiError;
use crate::models::attestation::AttestationId;
use crate::models::verification::{
    ApiErrorBody, CreatedVerification, LinkAttestationBody, NewRequest, NewVerification,
    RevealedValue, ValueCheck, VerificationRecord, VerificationRequest, VerificationStats,
    VerifierBody, VerifyValueBody, WorldVerification, WorldcoinStatus,
};
use crate::services::retry::retry_send;
use ethers::types::Address;
use log::debug;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Handle to the VerifyENS API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    /// Creates a client for the API at `base_url`.
    ///
    /// # Errors
    /// `InvalidUrl` when `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Self::new(
            &settings.api_url,
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // ---- verifications ----

    /// Stores an ENS-issued verification.
    pub async fn create_verification(
        &self,
        verification: &NewVerification,
    ) -> Result<CreatedVerification, ApiError> {
        self.post_json(&["api", "verifications"], verification).await
    }

    /// Stores a World ID verification.
    pub async fn create_world_verification(
        &self,
        verification: &WorldVerification,
    ) -> Result<CreatedVerification, ApiError> {
        self.post_json(&["verify", "world"], verification).await
    }

    /// All verifications of `ens_name`.
    pub async fn list_verifications(&self, ens_name: &str) -> Result<Vec<VerificationRecord>, ApiError> {
        self.get_json(&["api", "verifications", ens_name]).await
    }

    pub async fn verification_stats(&self, ens_name: &str) -> Result<VerificationStats, ApiError> {
        self.get_json(&["api", "verifications", ens_name, "stats"]).await
    }

    /// Verifications issued by `verifier`.
    pub async fn list_by_verifier(&self, verifier: Address) -> Result<Vec<VerificationRecord>, ApiError> {
        let verifier = address_hex(verifier);
        self.get_json(&["api", "verifications", "verifier", "ens", &verifier])
            .await
    }

    pub async fn revoke_verification(&self, id: &str, verifier: Address) -> Result<(), ApiError> {
        let body = VerifierBody {
            verifier_address: verifier,
        };
        self.post_unit(&["api", "verifications", id, "revoke"], &body)
            .await
    }

    /// Links an on-chain attestation to an existing verification.
    pub async fn link_attestation(
        &self,
        id: &str,
        attestation_uid: AttestationId,
        verifier: Address,
    ) -> Result<(), ApiError> {
        let body = LinkAttestationBody {
            attestation_uid,
            verifier_address: verifier,
        };
        self.post_unit(&["api", "verifications", id, "attestation"], &body)
            .await
    }

    // ---- requests ----

    pub async fn create_request(&self, request: &NewRequest) -> Result<VerificationRequest, ApiError> {
        self.post_json(&["api", "requests"], request).await
    }

    pub async fn get_request(&self, id: &str) -> Result<VerificationRequest, ApiError> {
        self.get_json(&["api", "requests", "id", id]).await
    }

    /// The value the subject revealed to `verifier`.
    ///
    /// `Ok(None)` when the API refuses (any non-2xx): the request is not in
    /// reveal mode, or not yet answered. Callers fall back to
    /// [`ApiClient::get_request`].
    pub async fn reveal_request(
        &self,
        id: &str,
        verifier: Address,
    ) -> Result<Option<RevealedValue>, ApiError> {
        let url = self.endpoint(&["api", "requests", id, "reveal"])?;
        let label = url.path().to_string();
        let verifier = address_hex(verifier);
        let resp = retry_send(&label, || {
            self.http
                .get(url.clone())
                .query(&[("verifierAddress", verifier.as_str())])
                .send()
        })
        .await
        .map_err(|source| ApiError::Http {
            endpoint: label.clone(),
            source,
        })?;
        if !resp.status().is_success() {
            debug!("{} answered {}; value not revealed", label, resp.status());
            return Ok(None);
        }
        read_json(&label, resp).await.map(Some)
    }

    /// Asks the API to compare a typed value with the subject's commitment.
    pub async fn verify_value(
        &self,
        id: &str,
        verifier: Address,
        typed_value: &str,
    ) -> Result<ValueCheck, ApiError> {
        let body = VerifyValueBody {
            verifier_address: verifier,
            typed_value,
        };
        self.post_json(&["api", "requests", id, "verify-value"], &body)
            .await
    }

    /// Marks a request as fulfilled.
    pub async fn complete_request(&self, id: &str, verifier: Address) -> Result<(), ApiError> {
        let body = VerifierBody {
            verifier_address: verifier,
        };
        self.post_unit(&["api", "requests", id, "complete"], &body)
            .await
    }

    /// Requests created by `verifier`.
    pub async fn list_requests(&self, verifier: Address) -> Result<Vec<VerificationRequest>, ApiError> {
        let verifier = address_hex(verifier);
        self.get_json(&["api", "requests", "verifier", &verifier]).await
    }

    // ---- worldcoin ----

    pub async fn worldcoin_status(&self, address: Address) -> Result<WorldcoinStatus, ApiError> {
        let address = address_hex(address);
        self.get_json(&["api", "worldcoin", &address]).await
    }

    // ---- plumbing ----

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        let label = url.path().to_string();
        debug!("GET {}", label);
        let resp = retry_send(&label, || self.http.get(url.clone()).send())
            .await
            .map_err(|source| ApiError::Http {
                endpoint: label.clone(),
                source,
            })?;
        let resp = check_status(&label, resp).await?;
        read_json(&label, resp).await
    }

    async fn post(&self, segments: &[&str], body: &(impl Serialize + ?Sized)) -> Result<(String, Response), ApiError> {
        let url = self.endpoint(segments)?;
        let label = url.path().to_string();
        debug!("POST {}", label);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Http {
                endpoint: label.clone(),
                source,
            })?;
        let resp = check_status(&label, resp).await?;
        Ok((label, resp))
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &(impl Serialize + ?Sized),
    ) -> Result<T, ApiError> {
        let (label, resp) = self.post(segments, body).await?;
        read_json(&label, resp).await
    }

    async fn post_unit(&self, segments: &[&str], body: &(impl Serialize + ?Sized)) -> Result<(), ApiError> {
        self.post(segments, body).await.map(|_| ())
    }
}

/// Lower-cased `0x` form used in API paths.
fn address_hex(address: Address) -> String {
    format!("0x{:x}", address)
}

/// Turns a non-2xx response into `ApiError::Status`, preferring the API's
/// `{"error": ...}` message over the raw body.
async fn check_status(endpoint: &str, resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => body.error,
        Err(_) if !text.trim().is_empty() => text,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    Err(ApiError::Status {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(endpoint: &str, resp: Response) -> Result<T, ApiError> {
    let text = resp.text().await.map_err(|source| ApiError::Http {
        endpoint: endpoint.to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ApiError::Deserialization {
        endpoint: endpoint.to_string(),
        source,
    })
}
