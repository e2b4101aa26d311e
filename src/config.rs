//! Runtime settings handed to the dispatch core

use std::time::Duration;

use crate::models::config::{PluginFailurePolicy, ServerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub default_language: Option<String>,
    pub plugin_failure: PluginFailurePolicy,
    pub plugin_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for DispatchSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            default_language: config
                .dispatch
                .default_language
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
            plugin_failure: config.dispatch.plugin_failure,
            plugin_timeout: Duration::from_secs(config.plugins.timeout_secs.max(1)),
        }
    }
}

impl DispatchSettings {
    pub fn with_default_language(mut self, language: Option<&str>) -> Self {
        self.default_language = language.map(str::to_string);
        self
    }

    pub fn with_plugin_failure(mut self, policy: PluginFailurePolicy) -> Self {
        self.plugin_failure = policy;
        self
    }

    pub fn degrades_plugin_failures(&self) -> bool {
        self.plugin_failure == PluginFailurePolicy::Degrade
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLimits {
    pub max_concurrent: usize,
    pub request_timeout: Duration,
}

impl Default for HostLimits {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for HostLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_concurrent: config.server.max_concurrent.max(1),
            request_timeout: Duration::from_secs(config.server.request_timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_default_config() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.default_language.as_deref(), Some("csharp"));
        assert_eq!(settings.plugin_timeout, Duration::from_secs(30));
        assert!(!settings.degrades_plugin_failures());
    }

    #[test]
    fn test_blank_default_language_is_unset() {
        let mut config = ServerConfig::default();
        config.dispatch.default_language = Some("  ".to_string());
        assert_eq!(DispatchSettings::from(&config).default_language, None);
    }

    #[test]
    fn test_zero_limits_are_clamped() {
        let mut config = ServerConfig::default();
        config.server.max_concurrent = 0;
        config.plugins.timeout_secs = 0;
        assert_eq!(HostLimits::from(&config).max_concurrent, 1);
        assert_eq!(
            DispatchSettings::from(&config).plugin_timeout,
            Duration::from_secs(1)
        );
    }
}
