//! Error types for omnidispatch

use std::time::Duration;

use thiserror::Error;

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Never surfaced to callers; the router substitutes an empty request.
    #[error("Malformed request payload: {0}")]
    RequestDecode(#[source] serde_json::Error),

    #[error("{language} does not support {endpoint}")]
    NoHandlerForLanguage { endpoint: String, language: String },

    #[error("Plugin '{plugin}' failed on {endpoint}: {source}")]
    PluginCommunication {
        plugin: String,
        endpoint: String,
        #[source]
        source: PluginError,
    },

    #[error("Must be able to aggregate responses from all handlers for {endpoint}")]
    AggregationContractViolation { endpoint: String },

    #[error("{language} handler for {endpoint} failed: {message}")]
    HandlerExecution {
        endpoint: String,
        language: String,
        message: String,
    },

    #[error("Command '{0}' is not supported.")]
    UnknownEndpoint(String),

    #[error("Endpoint registered twice: {0}")]
    DuplicateEndpoint(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DispatchError {
    pub fn no_handler(endpoint: &str, language: &str) -> Self {
        Self::NoHandlerForLanguage {
            endpoint: endpoint.to_string(),
            language: language.to_string(),
        }
    }

    pub fn aggregation(endpoint: &str) -> Self {
        Self::AggregationContractViolation {
            endpoint: endpoint.to_string(),
        }
    }

    pub fn plugin(plugin: &str, endpoint: &str, source: PluginError) -> Self {
        Self::PluginCommunication {
            plugin: plugin.to_string(),
            endpoint: endpoint.to_string(),
            source,
        }
    }

    pub fn is_plugin_failure(&self) -> bool {
        matches!(self, Self::PluginCommunication { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
            || matches!(
                self,
                Self::PluginCommunication {
                    source: PluginError::Cancelled,
                    ..
                }
            )
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Failed to start plugin process: {0}")]
    Spawn(String),

    #[error("Plugin channel closed")]
    Closed,

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Plugin reported an error: {0}")]
    Remote(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Position {line}:{column} is outside {path}")]
    InvalidPosition {
        path: String,
        line: u32,
        column: u32,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
