pub mod attestation;
pub mod field;
pub mod verification;
