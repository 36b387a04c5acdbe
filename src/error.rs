// src/error.rs
//! Error types for every layer of the crate.
//!
//! Each collaborator (REST API, wallet, attestation registry, configuration)
//! has its own enum so callers can tell a network failure from a rejected
//! signature. [`VerifyError`] folds them together for the verification flow.

use thiserror::Error;

/// Errors from calls to the VerifyENS REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The API answered with a non-2xx status.
    #[error("API {endpoint} returned {status}: {message}")]
    Status {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// The response body did not have the expected shape.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: serde_json::Error,
    },
    /// The configured base URL cannot be used.
    #[error("invalid API url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status code of an API-level failure, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from the connected wallet.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("wallet is on chain {actual}, but chain {expected} is required")]
    ChainMismatch { expected: u64, actual: u64 },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),
}

/// Errors from the attestation registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("RPC endpoint serves chain {actual}, expected {expected}")]
    WrongChain { expected: u64, actual: u64 },

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("transaction {0} was dropped before it was mined")]
    Dropped(String),

    #[error("transaction {0} reverted")]
    Reverted(String),

    #[error("no Attested event in receipt of {0}")]
    MissingAttestedEvent(String),

    #[error("attestation registry is disabled")]
    Disabled,
}

/// Errors while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the verification flow.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The caller supplied incomplete or malformed input.
    #[error("{0}")]
    Validation(String),

    /// A commitment-only request was not yet matched against a value.
    #[error("value has not been verified against the subject's commitment")]
    ValueNotVerified,

    /// The supplied value does not match the subject's commitment.
    #[error("value does not match the subject's commitment")]
    ValueMismatch,

    /// Only ENS owners may issue ENS verifications.
    #[error("an ENS name is required to issue this verification; use World ID instead")]
    EnsNameRequired,

    /// Requesting verifications needs World ID or an ENS name.
    #[error("a Worldcoin verification or an ENS name is required to request verifications")]
    NotEligible,
}

pub type VerifyResult<T> = Result<T, VerifyError>;
