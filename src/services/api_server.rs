// src/services/api_server.rs
//! Local agent API.
//!
//! Exposes the verification flow of one verifier wallet to local tooling
//! over HTTP. Meant to listen on loopback only: whoever can reach it can
//! sign and attest in the verifier's name.
//!
//! Endpoints:
//! - `POST /field-hash` compute a commitment
//! - `POST /verifications` sign and store an ENS verification
//! - `POST /verifications/world` store a World ID verification
//! - `POST /verifications/:id/attestation` attest an existing verification
//! - `POST /verifications/:id/revoke`
//! - `GET  /verifications/:ens` search a subject
//! - `POST /requests`, `GET /requests`
//! - `POST /requests/:id/check-value` check a value through the reveal gate
//! - `GET  /health`

use crate::error::{ApiError, RegistryError, VerifyError, WalletError};
use crate::models::attestation::AttestationId;
use crate::models::field::{FieldCommitment, FieldType};
use crate::models::verification::WorldProof;
use crate::services::verification_flow::{RequestContext, VerificationDraft, Verifier};
use crate::utils::commitment::commit_typed_field;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

// API request and response structures

/// Request payload for computing a commitment
#[derive(Deserialize)]
struct FieldHashRequest {
    field: FieldType,
    value: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldHashResponse {
    field_hash: FieldCommitment,
}

/// Request payload for creating a verification
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVerificationRequest {
    verified_ens: String,
    field: FieldType,
    value: String,
    #[serde(default)]
    method_url: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_attest")]
    attest: bool,
    /// Request being answered, if any.
    #[serde(default)]
    request_id: Option<String>,
}

impl CreateVerificationRequest {
    fn draft(&self) -> VerificationDraft {
        VerificationDraft {
            verified_ens: self.verified_ens.clone(),
            field: self.field.clone(),
            value: self.value.clone(),
            method_url: self.method_url.clone(),
            expires_at: self.expires_at,
            attest: self.attest,
        }
    }
}

fn default_attest() -> bool {
    true
}

/// Request payload for a World ID verification
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWorldVerificationRequest {
    #[serde(flatten)]
    verification: CreateVerificationRequest,
    world_proof: WorldProof,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachAttestationResponse {
    attestation_uid: AttestationId,
    explorer_url: Option<String>,
}

/// Request payload for asking a subject for a field
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequestRequest {
    verified_ens: String,
    field: FieldType,
}

#[derive(Deserialize)]
struct CheckValueRequest {
    value: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckValueResponse {
    matches: bool,
    field_hash: Option<FieldCommitment>,
}

/// Maps flow errors onto status codes with an `{"error": ...}` body.
pub struct AppError(VerifyError);

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        AppError(err)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            VerifyError::Validation(_) => StatusCode::BAD_REQUEST,
            VerifyError::EnsNameRequired | VerifyError::NotEligible => StatusCode::FORBIDDEN,
            VerifyError::ValueNotVerified | VerifyError::ValueMismatch => StatusCode::CONFLICT,
            VerifyError::Wallet(WalletError::ChainMismatch { .. }) => StatusCode::CONFLICT,
            VerifyError::Wallet(_) | VerifyError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VerifyError::Api(ApiError::Status { status: 404, .. }) => StatusCode::NOT_FOUND,
            VerifyError::Api(_) => StatusCode::BAD_GATEWAY,
            VerifyError::Registry(RegistryError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            VerifyError::Registry(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// API server state shared by all handlers
#[derive(Clone)]
pub struct ApiServer {
    verifier: Arc<Verifier>,
    /// Open requests loaded by `check-value`, keyed by request id. Each
    /// context has its own lock so a check in flight is seen by a
    /// concurrent create.
    requests: Arc<Mutex<HashMap<String, Arc<Mutex<RequestContext>>>>>,
}

impl ApiServer {
    pub fn new(verifier: Verifier) -> Self {
        ApiServer {
            verifier: Arc::new(verifier),
            requests: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// All routes with their shared state.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/field-hash", post(Self::field_hash_handler))
            .route("/verifications", post(Self::create_verification_handler))
            .route("/verifications/world", post(Self::create_world_verification_handler))
            .route("/verifications/:id", get(Self::search_handler))
            .route("/verifications/:id/attestation", post(Self::attach_attestation_handler))
            .route("/verifications/:id/revoke", post(Self::revoke_handler))
            .route("/requests", post(Self::create_request_handler).get(Self::list_requests_handler))
            .route("/requests/:id/check-value", post(Self::check_value_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the process is stopped
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("agent API listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// # Endpoint
    /// GET /health
    async fn health_handler(State(state): State<Arc<ApiServer>>) -> impl IntoResponse {
        let wallet = state.verifier.wallet();
        Json(json!({
            "status": "ok",
            "address": wallet.address_hex(),
            "chainId": wallet.chain_id(),
            "ensName": wallet.ens_name(),
            "attestations": state.verifier.attestations_enabled(),
        }))
    }

    /// Computes the commitment of a value without sending it anywhere
    ///
    /// # Endpoint
    /// POST /field-hash
    ///
    /// # Responses
    /// - 200 OK: Returns `fieldHash`
    /// - 400 Bad Request: Empty value
    async fn field_hash_handler(Json(payload): Json<FieldHashRequest>) -> Result<Json<FieldHashResponse>, AppError> {
        let field_hash = commit_typed_field(&payload.field, &payload.value)
            .ok_or_else(|| VerifyError::Validation("a value is required".into()))?;
        Ok(Json(FieldHashResponse { field_hash }))
    }

    /// Signs and stores a verification, answering a request when
    /// `requestId` is given
    ///
    /// # Endpoint
    /// POST /verifications
    ///
    /// # Responses
    /// - 201 Created: Returns the outcome, including the attestation status
    /// - 400 Bad Request: Missing subject or value
    /// - 403 Forbidden: Wallet has no ENS name
    /// - 409 Conflict: Request value not checked, or wallet on the wrong chain
    /// - 502 Bad Gateway: VerifyENS API failed
    async fn create_verification_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateVerificationRequest>,
    ) -> Result<impl IntoResponse, AppError> {
        let draft = payload.draft();
        let ctx = state.checked_request(payload.request_id.as_deref()).await?;
        let outcome = state
            .verifier
            .create_verification(&draft, ctx.as_ref())
            .await?;
        state.forget_request(payload.request_id.as_deref()).await;
        Ok((StatusCode::CREATED, Json(outcome)))
    }

    /// # Endpoint
    /// POST /verifications/world
    async fn create_world_verification_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateWorldVerificationRequest>,
    ) -> Result<impl IntoResponse, AppError> {
        let request_id = payload.verification.request_id.clone();
        let draft = payload.verification.draft();
        let ctx = state.checked_request(request_id.as_deref()).await?;
        let outcome = state
            .verifier
            .create_world_verification(&draft, payload.world_proof, ctx.as_ref())
            .await?;
        state.forget_request(request_id.as_deref()).await;
        Ok((StatusCode::CREATED, Json(outcome)))
    }

    /// Attests a verification issued by this wallet that has none yet
    ///
    /// # Endpoint
    /// POST /verifications/:id/attestation
    ///
    /// # Responses
    /// - 200 OK: Returns the attestation UID
    /// - 404 Not Found: No such verification issued by this wallet
    /// - 503 Service Unavailable: Attestations are disabled
    async fn attach_attestation_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<Response, AppError> {
        let records = state.verifier.my_verifications().await?;
        let record = match records.into_iter().find(|record| record.id == id) {
            Some(record) => record,
            None => {
                return Ok((
                    StatusCode::NOT_FOUND,
                    Json(json!({ "error": format!("verification {} not found", id) })),
                )
                    .into_response())
            }
        };
        let uid = state.verifier.attach_attestation(&record).await?;
        let explorer_url = state.verifier.explorer_url(uid);
        Ok(Json(AttachAttestationResponse {
            attestation_uid: uid,
            explorer_url,
        })
        .into_response())
    }

    /// # Endpoint
    /// POST /verifications/:id/revoke
    async fn revoke_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<StatusCode, AppError> {
        state.verifier.revoke(&id).await?;
        Ok(StatusCode::NO_CONTENT)
    }

    /// Verifications of an ENS name grouped by field
    ///
    /// # Endpoint
    /// GET /verifications/:ens
    async fn search_handler(
        Path(ens_name): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> Result<impl IntoResponse, AppError> {
        Ok(Json(state.verifier.search(&ens_name).await?))
    }

    /// # Endpoint
    /// POST /requests
    ///
    /// # Responses
    /// - 201 Created: Returns the stored request
    /// - 403 Forbidden: Wallet has neither an ENS name nor Worldcoin
    async fn create_request_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateRequestRequest>,
    ) -> Result<impl IntoResponse, AppError> {
        let request = state
            .verifier
            .request_verification(&payload.verified_ens, payload.field)
            .await?;
        Ok((StatusCode::CREATED, Json(request)))
    }

    /// # Endpoint
    /// GET /requests
    async fn list_requests_handler(State(state): State<Arc<ApiServer>>) -> Result<impl IntoResponse, AppError> {
        Ok(Json(state.verifier.my_requests().await?))
    }

    /// Checks a value against a request's commitment. A successful check
    /// is remembered until the request is answered.
    ///
    /// # Endpoint
    /// POST /requests/:id/check-value
    ///
    /// # Responses
    /// - 200 OK: `matches` with the commitment on success
    /// - 409 Conflict: The value could not be compared
    async fn check_value_handler(
        Path(id): Path<String>,
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CheckValueRequest>,
    ) -> Result<Json<CheckValueResponse>, AppError> {
        let entry = state.request_entry(&id).await?;
        let result = {
            let mut ctx = entry.lock().await;
            state.verifier.check_value(&mut ctx, &payload.value).await
        };
        match result {
            Ok(field_hash) => Ok(Json(CheckValueResponse {
                matches: true,
                field_hash: Some(field_hash),
            })),
            Err(VerifyError::ValueMismatch) => Ok(Json(CheckValueResponse {
                matches: false,
                field_hash: None,
            })),
            Err(e) => Err(e.into()),
        }
    }

    /// Cached context for `id`, loading it on first use. Requests that are
    /// no longer open are not cached.
    async fn request_entry(&self, id: &str) -> Result<Arc<Mutex<RequestContext>>, VerifyError> {
        let cached = self.requests.lock().await.get(id).cloned();
        if let Some(entry) = cached {
            return Ok(entry);
        }
        let ctx = self.verifier.load_request(id).await?;
        if !ctx.request.status.is_open() {
            return Ok(Arc::new(Mutex::new(ctx)));
        }
        let mut requests = self.requests.lock().await;
        let entry = requests
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ctx)));
        Ok(entry.clone())
    }

    /// The cached context for `request_id`, waiting for a check in flight.
    /// A request that was never checked is loaded fresh, so its gate only
    /// passes for a disclosed value.
    async fn checked_request(&self, request_id: Option<&str>) -> Result<Option<RequestContext>, VerifyError> {
        let id = match request_id {
            Some(id) => id,
            None => return Ok(None),
        };
        let cached = self.requests.lock().await.get(id).cloned();
        if let Some(entry) = cached {
            let ctx = entry.lock().await;
            return Ok(Some(ctx.clone()));
        }
        self.verifier.load_request(id).await.map(Some)
    }

    async fn forget_request(&self, request_id: Option<&str>) {
        if let Some(id) = request_id {
            self.requests.lock().await.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::api_client::ApiClient;
    use crate::utils::commitment::commit_field;
    use crate::wallet::connection::WalletConnection;
    use crate::wallet::key_management::KeyManager;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use k256::ecdsa::SigningKey;
    use mockito::{mock, Matcher};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn server_at(api_url: &str, ens_name: Option<&str>) -> ApiServer {
        let keys = KeyManager::from_signing_key(SigningKey::random(&mut rand::thread_rng()));
        let wallet = WalletConnection::new(Arc::new(keys), 11_155_111)
            .with_ens_name(ens_name.map(str::to_string));
        let api = ApiClient::new(api_url, Duration::from_secs(5)).unwrap();
        ApiServer::new(Verifier::new(api, wallet, 11_155_111))
    }

    fn server(ens_name: Option<&str>) -> ApiServer {
        // Nothing listens on port 1; these tests never reach the API.
        server_at("http://127.0.0.1:1", ens_name)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_wallet() {
        let app = server(Some("bob.eth")).router();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ensName"], "bob.eth");
        assert_eq!(body["chainId"], 11_155_111);
        assert_eq!(body["attestations"], false);
    }

    #[tokio::test]
    async fn test_field_hash() {
        let app = server(None).router();
        let response = app
            .oneshot(post_json("/field-hash", json!({ "field": "dob", "value": " 1990-01-01 " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["fieldHash"],
            commit_field("dob", "1990-01-01").unwrap().to_hex()
        );
    }

    #[tokio::test]
    async fn test_field_hash_rejects_empty_value() {
        let app = server(None).router();
        let response = app
            .oneshot(post_json("/field-hash", json!({ "field": "dob", "value": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_verification_without_ens_name_is_forbidden() {
        let app = server(None).router();
        let response = app
            .oneshot(post_json(
                "/verifications",
                json!({ "verifiedEns": "alice.eth", "field": "full_name", "value": "Alice" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unreachable_api_is_bad_gateway() {
        let app = server(Some("bob.eth")).router();
        let response = app
            .oneshot(Request::builder().uri("/verifications/alice.eth").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_checked_request_unlocks_verification() {
        let server = server_at(&mockito::server_url(), Some("bob.eth"));
        let address = format!("0x{:x}", server.verifier.wallet().address());
        let hash = commit_field("full_name", "Grace Hopper").unwrap();
        let _reveal = mock("GET", Matcher::Regex(r"^/api/requests/req-agent/reveal".into()))
            .with_status(403)
            .with_body(r#"{"error":"Value not revealed"}"#)
            .create();
        let _request = mock("GET", "/api/requests/id/req-agent")
            .with_status(200)
            .with_body(
                json!({
                    "id": "req-agent",
                    "verifierAddress": address,
                    "verifiedEns": "grace.eth",
                    "field": "full_name",
                    "status": "approved",
                    "revealMode": "no-reveal",
                    "fieldHash": hash.to_hex()
                })
                .to_string(),
            )
            .create();
        let create = mock("POST", "/api/verifications")
            .match_body(Matcher::PartialJson(json!({
                "verifiedEns": "grace.eth",
                "fieldHash": hash.to_hex(),
            })))
            .with_status(201)
            .with_body(r#"{"id":"ver-agent"}"#)
            .create();
        let complete = mock("POST", "/api/requests/req-agent/complete")
            .with_status(200)
            .with_body("{}")
            .create();

        let app = server.router();
        let body = json!({
            "verifiedEns": "grace.eth",
            "field": "full_name",
            "value": "Grace Hopper",
            "requestId": "req-agent",
            "attest": false
        });

        let response = app
            .clone()
            .oneshot(post_json("/verifications", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(post_json("/requests/req-agent/check-value", json!({ "value": " grace hopper " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let checked = body_json(response).await;
        assert_eq!(checked["matches"], true);
        assert_eq!(checked["fieldHash"], hash.to_hex());

        let response = app.oneshot(post_json("/verifications", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["recordId"], "ver-agent");
        create.assert();
        complete.assert();
        assert!(server.requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_closed_request_is_not_cached() {
        let server = server_at(&mockito::server_url(), Some("bob.eth"));
        let address = format!("0x{:x}", server.verifier.wallet().address());
        let hash = commit_field("dob", "1906-12-09").unwrap();
        let _reveal = mock("GET", Matcher::Regex(r"^/api/requests/req-closed/reveal".into()))
            .with_status(403)
            .create();
        let _request = mock("GET", "/api/requests/id/req-closed")
            .with_status(200)
            .with_body(
                json!({
                    "id": "req-closed",
                    "verifierAddress": address,
                    "verifiedEns": "grace.eth",
                    "field": "dob",
                    "status": "completed",
                    "fieldHash": hash.to_hex()
                })
                .to_string(),
            )
            .create();

        let response = server
            .router()
            .oneshot(post_json("/requests/req-closed/check-value", json!({ "value": "1906-12-09" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(server.requests.lock().await.is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: VerifyError| AppError(e).status();
        assert_eq!(status(VerifyError::ValueNotVerified), StatusCode::CONFLICT);
        assert_eq!(
            status(VerifyError::Wallet(WalletError::ChainMismatch {
                expected: 1,
                actual: 2
            })),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(VerifyError::Api(ApiError::Status {
                endpoint: "/x".into(),
                status: 404,
                message: "nope".into()
            })),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(VerifyError::Registry(RegistryError::Disabled)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(VerifyError::NotEligible), StatusCode::FORBIDDEN);
    }
}
