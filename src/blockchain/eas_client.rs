// src/blockchain/eas_client.rs
//! Ethereum Attestation Service client.
//!
//! Registers the verification schema on first use, then writes one
//! attestation per verification and reads the UID back from the
//! `Attested` event.

use crate::blockchain::evm_client::{encode_call, EvmClient};
use crate::blockchain::registry::AttestationRegistry;
use crate::blockchain::schema::{encode_attestation_data, SchemaDefinition};
use crate::config::AttestationSettings;
use crate::error::RegistryError;
use crate::models::attestation::{AttestationFields, AttestationId};
use crate::utils::crypto::to_prefixed_hex;
use async_trait::async_trait;
use ethers_core::abi::{decode, ParamType, Token};
use ethers_core::types::{Address, Log, TransactionReceipt, H256, U256};
use ethers_core::utils::keccak256;
use log::{info, warn};
use tokio::sync::OnceCell;

const ATTEST_SIG: &str = "attest((bytes32,(address,uint64,bool,bytes32,bytes,uint256)))";
const GET_SCHEMA_SIG: &str = "getSchema(bytes32)";
const REGISTER_SIG: &str = "register(string,address,bool)";
const ATTESTED_EVENT: &str = "Attested(address,address,bytes32,bytes32)";

/// Builds the `attest` calldata for `schema_uid` and encoded `data`.
///
/// No recipient, no expiration, revocable, no referenced attestation and no
/// value attached.
pub fn attest_calldata(schema_uid: [u8; 32], data: Vec<u8>) -> Vec<u8> {
    let request = Token::Tuple(vec![
        Token::FixedBytes(schema_uid.to_vec()),
        Token::Tuple(vec![
            Token::Address(Address::zero()),
            Token::Uint(U256::zero()),
            Token::Bool(true),
            Token::FixedBytes(vec![0u8; 32]),
            Token::Bytes(data),
            Token::Uint(U256::zero()),
        ]),
    ]);
    encode_call(ATTEST_SIG, &[request])
}

/// UID announced by the `Attested` event `eas` emitted in `logs`.
///
/// `Attested` indexes recipient, attester and schema; the UID is the only
/// word in the data.
pub fn attestation_uid_from_logs(eas: Address, logs: &[Log]) -> Option<AttestationId> {
    let topic = H256::from(keccak256(ATTESTED_EVENT.as_bytes()));
    logs.iter()
        .filter(|log| log.address == eas)
        .find(|log| log.topics.first() == Some(&topic))
        .and_then(|log| {
            let word: [u8; 32] = log.data.get(..32)?.try_into().ok()?;
            Some(AttestationId::from_bytes(word))
        })
}

#[derive(Debug)]
pub struct EasClient {
    client: EvmClient,
    eas: Address,
    schema_registry: Address,
    schema: SchemaDefinition,
    schema_uid: OnceCell<[u8; 32]>,
}

impl EasClient {
    pub fn new(client: EvmClient, eas: Address, schema_registry: Address) -> Self {
        Self {
            client,
            eas,
            schema_registry,
            schema: SchemaDefinition::verification(),
            schema_uid: OnceCell::new(),
        }
    }

    pub fn from_settings(client: EvmClient, settings: &AttestationSettings) -> Result<Self, RegistryError> {
        let eas = settings
            .eas_address()
            .map_err(|e| RegistryError::Contract(e.to_string()))?;
        let schema_registry = settings
            .schema_registry_address()
            .map_err(|e| RegistryError::Contract(e.to_string()))?;
        Ok(Self::new(client, eas, schema_registry))
    }

    /// UID of the verification schema, registering it if it is unknown to
    /// the SchemaRegistry. Checked once per client.
    pub async fn ensure_schema_registered(&self) -> Result<[u8; 32], RegistryError> {
        self.schema_uid
            .get_or_try_init(|| self.register_schema_if_missing())
            .await
            .copied()
    }

    async fn register_schema_if_missing(&self) -> Result<[u8; 32], RegistryError> {
        let uid = self.schema.uid();
        if self.schema_exists(uid).await? {
            return Ok(uid);
        }
        info!("registering schema {}", to_prefixed_hex(&uid));
        let calldata = encode_call(
            REGISTER_SIG,
            &[
                Token::String(self.schema.schema.clone()),
                Token::Address(self.schema.resolver),
                Token::Bool(self.schema.revocable),
            ],
        );
        self.client
            .send_transaction(self.schema_registry, calldata)
            .await?;
        Ok(uid)
    }

    async fn schema_exists(&self, uid: [u8; 32]) -> Result<bool, RegistryError> {
        let calldata = encode_call(GET_SCHEMA_SIG, &[Token::FixedBytes(uid.to_vec())]);
        let raw = self.client.query_contract(self.schema_registry, calldata).await?;
        let record = ParamType::Tuple(vec![
            ParamType::FixedBytes(32),
            ParamType::Address,
            ParamType::Bool,
            ParamType::String,
        ]);
        let tokens = decode(&[record], &raw).map_err(|e| RegistryError::Abi(e.to_string()))?;
        match tokens.as_slice() {
            [Token::Tuple(values)] => match values.first() {
                Some(Token::FixedBytes(stored)) => Ok(stored.iter().any(|b| *b != 0)),
                _ => Err(RegistryError::Abi("malformed SchemaRecord".into())),
            },
            _ => Err(RegistryError::Abi("malformed SchemaRecord".into())),
        }
    }

    /// Writes one attestation and returns its UID.
    pub async fn attest(&self, fields: &AttestationFields) -> Result<AttestationId, RegistryError> {
        let schema_uid = self.ensure_schema_registered().await?;
        let calldata = attest_calldata(schema_uid, encode_attestation_data(fields));
        let receipt: TransactionReceipt = self.client.send_transaction(self.eas, calldata).await?;
        let uid = attestation_uid_from_logs(self.eas, &receipt.logs).ok_or_else(|| {
            RegistryError::MissingAttestedEvent(format!("{:?}", receipt.transaction_hash))
        })?;
        info!(
            "attested {} for {} on chain {}",
            uid,
            fields.subject,
            self.client.chain_id()
        );
        Ok(uid)
    }
}

#[async_trait]
impl AttestationRegistry for EasClient {
    async fn submit_attestation(&self, fields: &AttestationFields) -> Result<AttestationId, RegistryError> {
        self.attest(fields).await.map_err(|e| {
            warn!("attestation for {} failed: {}", fields.subject, e);
            e
        })
    }
}
