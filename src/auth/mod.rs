pub mod jwt;
pub mod orchestrator;
pub mod request;
