//! omnidispatch - request dispatch and aggregation core
//!
//! Routes typed endpoint requests to the handlers registered for a language,
//! in process or in plugin processes, and merges their answers.

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod plugin;
pub mod protocol;
pub mod server;
pub mod services;
pub mod workspace;

pub use error::{DispatchError, DispatchResult};
