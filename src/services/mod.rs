pub mod api_client;
pub mod api_server;
pub mod retry;
pub mod reveal;
pub mod verification_flow;
