//! CLI command implementations

pub mod config;
pub mod endpoints;
pub mod serve;
