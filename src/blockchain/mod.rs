pub mod eas_client;
pub mod ens;
pub mod evm_client;
pub mod registry;
pub mod schema;
