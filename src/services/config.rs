//! Configuration service for omnidispatch

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::models::config::{PluginFailurePolicy, ServerConfig};

#[async_trait]
pub trait ConfigService: Send + Sync {
    async fn load(&self) -> Result<ServerConfig, ConfigError>;
    fn config_path(&self, global: bool) -> PathBuf;
    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError>;
}

pub struct DefaultConfigService {
    root: PathBuf,
    /// Replaces the project config when set.
    explicit: Option<PathBuf>,
}

impl DefaultConfigService {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            explicit: None,
        }
    }

    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    fn global_config_path() -> PathBuf {
        // XDG standard: ~/.config/omnidispatch/config.toml
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("omnidispatch")
            .join("config.toml")
    }

    fn project_config_path(&self) -> PathBuf {
        self.root.join(".omnidispatch").join("config.toml")
    }

    async fn read_table(path: &Path) -> Result<Option<toml::Table>, ConfigError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path).await?;
        content
            .parse::<toml::Table>()
            .map(Some)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))
    }

    async fn write_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let config = ServerConfig::default();
        let content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigService for DefaultConfigService {
    async fn load(&self) -> Result<ServerConfig, ConfigError> {
        let mut merged = Self::read_table(&Self::global_config_path())
            .await?
            .unwrap_or_default();

        let overlay = match &self.explicit {
            Some(path) => Some(Self::read_table(path).await?.ok_or_else(|| {
                ConfigError::NotFound(format!("Config file does not exist: {}", path.display()))
            })?),
            None => Self::read_table(&self.project_config_path()).await?,
        };
        if let Some(overlay) = overlay {
            merge_tables(&mut merged, overlay);
        }

        let config: ServerConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        apply_env_overrides(config)
    }

    fn config_path(&self, global: bool) -> PathBuf {
        if global {
            Self::global_config_path()
        } else {
            self.explicit
                .clone()
                .unwrap_or_else(|| self.project_config_path())
        }
    }

    async fn init(&self, global: bool, force: bool) -> Result<PathBuf, ConfigError> {
        let path = self.config_path(global);

        if path.exists() && !force {
            return Err(ConfigError::InvalidValue {
                key: "config".to_string(),
                message: format!(
                    "Config already exists: {}. Use --force to overwrite.",
                    path.display()
                ),
            });
        }

        Self::write_default_config(&path).await?;
        Ok(path)
    }
}

/// Overlay wins key by key; nested tables merge, arrays are replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(mut config: ServerConfig) -> Result<ServerConfig, ConfigError> {
    if let Ok(val) = std::env::var("OMNIDISPATCH_DEFAULT_LANGUAGE") {
        config.dispatch.default_language = Some(val).filter(|v| !v.trim().is_empty());
    }
    if let Ok(val) = std::env::var("OMNIDISPATCH_PLUGIN_TIMEOUT") {
        config.plugins.timeout_secs = val.parse().map_err(|_| ConfigError::InvalidValue {
            key: "OMNIDISPATCH_PLUGIN_TIMEOUT".to_string(),
            message: format!("expected seconds, got '{}'", val),
        })?;
    }
    if let Ok(val) = std::env::var("OMNIDISPATCH_PLUGIN_FAILURE") {
        config.dispatch.plugin_failure =
            val.parse::<PluginFailurePolicy>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "OMNIDISPATCH_PLUGIN_FAILURE".to_string(),
                    message,
                })?;
    }
    Ok(config)
}
