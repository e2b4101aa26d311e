//! Out-of-process handler adapter

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::channel::{PluginChannel, StdioChannel};
use crate::dispatch::resolver::ProjectSystem;
use crate::error::PluginError;
use crate::models::config::PluginDescriptor;
use crate::models::endpoint::Endpoint;

/// Presents one plugin process as a handler for every endpoint it
/// advertises. Support is decided by the configured endpoint list alone.
pub struct PluginProxy {
    descriptor: PluginDescriptor,
    endpoints: HashSet<String>,
    channel: Arc<dyn PluginChannel>,
    /// Held for the whole call when the plugin is strictly request-response.
    exclusive: Option<Mutex<()>>,
    timeout: Duration,
}

impl PluginProxy {
    pub fn new(descriptor: PluginDescriptor, channel: Arc<dyn PluginChannel>, timeout: Duration) -> Self {
        let endpoints = descriptor
            .endpoints
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        let exclusive = (!descriptor.pipelined).then(|| Mutex::new(()));

        Self {
            descriptor,
            endpoints,
            channel,
            exclusive,
            timeout,
        }
    }

    pub async fn spawn(
        descriptor: PluginDescriptor,
        root: Option<&Path>,
        timeout: Duration,
    ) -> Result<Self, PluginError> {
        let channel = StdioChannel::spawn(&descriptor, root).await?;
        Ok(Self::new(descriptor, channel, timeout))
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn supports(&self, endpoint: &str) -> bool {
        self.endpoints.contains(&endpoint.to_ascii_lowercase())
    }

    /// Forward a typed request. A null body means the plugin had no answer.
    pub async fn handle<E: Endpoint>(
        &self,
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> Result<Option<E::Response>, PluginError> {
        let arguments =
            serde_json::to_value(request).map_err(|e| PluginError::Malformed(e.to_string()))?;

        let body = self.call(E::NAME, arguments, cancel).await?;
        if body.is_null() {
            return Ok(None);
        }

        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| PluginError::Malformed(format!("{} response: {}", E::NAME, e)))
    }

    pub async fn call(
        &self,
        command: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, PluginError> {
        let _guard = match &self.exclusive {
            Some(lock) => Some(tokio::select! {
                guard = lock.lock() => guard,
                _ = cancel.cancelled() => return Err(PluginError::Cancelled),
            }),
            None => None,
        };

        self.channel
            .request(command, arguments, self.timeout, cancel)
            .await
    }

    pub async fn shutdown(&self) {
        self.channel.shutdown().await;
    }
}

impl ProjectSystem for PluginProxy {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn language(&self) -> &str {
        &self.descriptor.language
    }

    fn extensions(&self) -> &[String] {
        &self.descriptor.extensions
    }

    fn is_initialized(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for PluginProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginProxy")
            .field("name", &self.descriptor.name)
            .field("language", &self.descriptor.language)
            .field("pipelined", &self.descriptor.pipelined)
            .finish()
    }
}
