// src/blockchain/schema.rs
//! EAS schema for verification attestations.
//!
//! Attestation data is the plain ABI encoding of the schema's values in
//! declaration order, exactly what the EAS SDK's `SchemaEncoder` produces.

use crate::error::RegistryError;
use crate::models::attestation::{AttestationFields, IssuerType};
use crate::models::field::FieldCommitment;
use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::Address;
use ethers_core::utils::keccak256;

/// Schema registered with EAS for verifications.
pub const VERIFICATION_SCHEMA: &str = "string verifiedEns,string field,bytes32 fieldHash,string verifierType,string verifierId,string ensName,string methodUrl";

/// A schema as registered with the EAS SchemaRegistry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    pub schema: String,
    pub resolver: Address,
    pub revocable: bool,
}

impl SchemaDefinition {
    /// The verification schema: no resolver, revocable.
    pub fn verification() -> Self {
        Self {
            schema: VERIFICATION_SCHEMA.to_string(),
            resolver: Address::zero(),
            revocable: true,
        }
    }

    /// `keccak256(abi.encodePacked(schema, resolver, revocable))`, the UID the
    /// SchemaRegistry assigns on registration.
    pub fn uid(&self) -> [u8; 32] {
        let mut packed = Vec::with_capacity(self.schema.len() + 21);
        packed.extend_from_slice(self.schema.as_bytes());
        packed.extend_from_slice(self.resolver.as_bytes());
        packed.push(u8::from(self.revocable));
        keccak256(packed)
    }
}

fn schema_param_types() -> Vec<ParamType> {
    vec![
        ParamType::String,
        ParamType::String,
        ParamType::FixedBytes(32),
        ParamType::String,
        ParamType::String,
        ParamType::String,
        ParamType::String,
    ]
}

/// ABI-encodes `fields` under [`VERIFICATION_SCHEMA`].
pub fn encode_attestation_data(fields: &AttestationFields) -> Vec<u8> {
    encode(&[
        Token::String(fields.subject.clone()),
        Token::String(fields.field.as_str().to_string()),
        Token::FixedBytes(fields.field_hash.as_bytes().to_vec()),
        Token::String(fields.issuer_type.as_str().to_string()),
        Token::String(fields.issuer_id.clone()),
        Token::String(fields.issuer_name.clone()),
        Token::String(fields.method_url.clone()),
    ])
}

/// Decodes attestation data written under [`VERIFICATION_SCHEMA`].
pub fn decode_attestation_data(data: &[u8]) -> Result<AttestationFields, RegistryError> {
    let tokens = decode(&schema_param_types(), data).map_err(|e| RegistryError::Abi(e.to_string()))?;
    match tokens.as_slice() {
        [Token::String(subject), Token::String(field), Token::FixedBytes(hash), Token::String(issuer_type), Token::String(issuer_id), Token::String(issuer_name), Token::String(method_url)] =>
        {
            let hash: [u8; 32] = hash
                .as_slice()
                .try_into()
                .map_err(|_| RegistryError::Abi("fieldHash is not 32 bytes".into()))?;
            let issuer_type = match issuer_type.as_str() {
                "ens" => IssuerType::Ens,
                "world" => IssuerType::World,
                other => {
                    return Err(RegistryError::Abi(format!("unknown verifierType {}", other)))
                }
            };
            let field = field
                .parse()
                .map_err(|e| RegistryError::Abi(format!("field: {}", e)))?;
            Ok(AttestationFields {
                subject: subject.clone(),
                field,
                field_hash: FieldCommitment::from_bytes(hash),
                issuer_type,
                issuer_id: issuer_id.clone(),
                issuer_name: issuer_name.clone(),
                method_url: method_url.clone(),
            })
        }
        _ => Err(RegistryError::Abi("attestation data does not match schema".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::field::FieldType;
    use crate::utils::commitment::commit_field;

    fn sample_fields() -> AttestationFields {
        AttestationFields::for_ens_issuer(
            "Alice.eth",
            FieldType::FullName,
            commit_field("full_name", "Alice Smith").unwrap(),
            "0x00000000000000000000000000000000000000aa".parse().unwrap(),
            Some("bob.eth"),
            Some("https://example.org/kyc"),
        )
    }

    #[test]
    fn test_field_hash_is_third_head_word() {
        let fields = sample_fields();
        let data = encode_attestation_data(&fields);
        // Seven head words, then the string tails.
        assert!(data.len() > 7 * 32);
        assert_eq!(&data[64..96], fields.field_hash.as_bytes());
        // First word is the offset of the first string tail.
        assert_eq!(data[31], (7 * 32) as u8);
    }

    #[test]
    fn test_decode_recovers_fields() {
        let fields = sample_fields();
        let decoded = decode_attestation_data(&encode_attestation_data(&fields)).unwrap();
        assert_eq!(decoded, fields);
        assert_eq!(decoded.subject, "alice.eth");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_attestation_data(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_schema_uid_is_packed_keccak() {
        let schema = SchemaDefinition::verification();
        let mut packed = VERIFICATION_SCHEMA.as_bytes().to_vec();
        packed.extend_from_slice(&[0u8; 20]);
        packed.push(1);
        assert_eq!(schema.uid(), keccak256(packed));

        let irrevocable = SchemaDefinition {
            revocable: false,
            ..SchemaDefinition::verification()
        };
        assert_ne!(irrevocable.uid(), schema.uid());
    }

    #[test]
    fn test_schema_lists_seven_fields() {
        assert_eq!(VERIFICATION_SCHEMA.split(',').count(), 7);
        assert_eq!(schema_param_types().len(), 7);
    }
}
