//! Data models for omnidispatch
//!
//! Endpoint contracts, their request and response payloads and the
//! configuration schema.

pub mod config;
pub mod endpoint;
pub mod request;
pub mod response;

pub use config::ServerConfig;
pub use endpoint::{Endpoint, EndpointDescriptor};
