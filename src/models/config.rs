//! Configuration model for omnidispatch

use serde::{Deserialize, Serialize};

/// omnidispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub project_systems: Vec<ProjectSystemConfig>,

    #[serde(default)]
    pub server: HostSettings,
}

/// What happens to an aggregate call when one plugin contributor fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluginFailurePolicy {
    /// Fail the whole call
    #[default]
    Fail,
    /// Drop the failed contribution and merge the rest
    Degrade,
}

impl std::str::FromStr for PluginFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "degrade" => Ok(Self::Degrade),
            other => Err(format!("expected 'fail' or 'degrade', got '{}'", other)),
        }
    }
}

/// Routing behaviour of the dispatch core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Fallback language for legacy requests that name no language
    #[serde(default = "defaults::default_language")]
    pub default_language: Option<String>,

    #[serde(default)]
    pub plugin_failure: PluginFailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_language: defaults::default_language(),
            plugin_failure: PluginFailurePolicy::default(),
        }
    }
}

/// Out-of-process plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "defaults::plugin_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub entries: Vec<PluginDescriptor>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::plugin_timeout_secs(),
            entries: Vec::new(),
        }
    }
}

/// Static configuration for one plugin process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,

    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Language tag the plugin serves
    pub language: String,

    /// Extensions the plugin claims for routing, with leading dot
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Endpoint names the plugin advertises
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Whether the plugin accepts several requests in flight
    #[serde(default = "defaults::pipelined")]
    pub pipelined: bool,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            language: language.into(),
            extensions: Vec::new(),
            endpoints: Vec::new(),
            pipelined: defaults::pipelined(),
        }
    }

    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// A project system declared in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSystemConfig {
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Stdio host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            request_timeout_secs: defaults::request_timeout_secs(),
        }
    }
}

mod defaults {
    // Dispatch
    pub fn default_language() -> Option<String> {
        Some("csharp".to_string())
    }

    // Plugins
    pub fn plugin_timeout_secs() -> u64 {
        30
    }
    pub fn pipelined() -> bool {
        true
    }

    // Host
    pub fn max_concurrent() -> usize {
        64
    }
    pub fn request_timeout_secs() -> u64 {
        120
    }
}
