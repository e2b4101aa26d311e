//! External plugin processes

pub mod channel;
pub mod proxy;

pub use channel::{PluginChannel, StdioChannel};
pub use proxy::PluginProxy;
