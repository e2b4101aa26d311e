//! Service layer for omnidispatch

pub mod buffer;
pub mod config;

pub use buffer::UpdateBufferService;
pub use config::{ConfigService, DefaultConfigService};
