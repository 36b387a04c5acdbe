pub mod commitment;
pub mod crypto;
