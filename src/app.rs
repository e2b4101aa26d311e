//! Application container for omnidispatch

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::OutputContext;
use crate::config::{DispatchSettings, HostLimits};
use crate::dispatch::{
    CapabilityRegistry, EndpointRouter, ProjectSystem, ProjectSystemPredicate, RouterBuilder,
    StaticProjectSystem, UpdateBufferInterceptor, WILDCARD_LANGUAGE,
};
use crate::error::DispatchResult;
use crate::models::config::ServerConfig;
use crate::models::endpoint::UpdateBuffer;
use crate::plugin::PluginProxy;
use crate::server::StdioHost;
use crate::services::buffer::UpdateBufferService;
use crate::services::config::{ConfigService, DefaultConfigService};
use crate::workspace::InMemoryWorkspace;

pub struct App {
    root: PathBuf,
    pub(crate) output: OutputContext,
    pub(crate) config_service: Arc<dyn ConfigService>,
    pub(crate) config: ServerConfig,
}

impl App {
    pub async fn new(root: Option<PathBuf>, config_file: Option<PathBuf>) -> anyhow::Result<Self> {
        let root = match root {
            Some(root) => root,
            None => std::env::current_dir()?,
        };

        tracing::debug!("Initializing omnidispatch at {:?}", root);

        let output = OutputContext::new(root.clone());
        let config_service = Arc::new(DefaultConfigService::new(&root).with_explicit(config_file));
        let config = config_service.load().await?;

        Ok(Self {
            root,
            output,
            config_service,
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Start every configured plugin and wire the dispatch core.
    pub async fn start(&self) -> anyhow::Result<Server> {
        let settings = DispatchSettings::from(&self.config);
        let mut plugins = Vec::with_capacity(self.config.plugins.entries.len());

        for descriptor in &self.config.plugins.entries {
            match PluginProxy::spawn(descriptor.clone(), Some(self.root.as_path()), settings.plugin_timeout)
                .await
            {
                Ok(proxy) => plugins.push(Arc::new(proxy)),
                Err(e) => tracing::error!("Plugin {} unavailable: {}", descriptor.name, e),
            }
        }

        let server = Server::compose(&self.config, plugins)?;
        tracing::info!(
            "omnidispatch ready ({} plugin(s), {} endpoint(s))",
            server.plugins.len(),
            server.router.descriptors().len()
        );
        Ok(server)
    }

    /// The dispatch core with no plugin processes attached.
    pub fn offline(&self) -> DispatchResult<Server> {
        Server::compose(&self.config, Vec::new())
    }
}

/// A wired dispatch core.
pub struct Server {
    pub router: Arc<EndpointRouter>,
    pub workspace: Arc<InMemoryWorkspace>,
    pub registry: Arc<CapabilityRegistry>,
    plugins: Vec<Arc<PluginProxy>>,
    limits: HostLimits,
}

impl Server {
    pub fn compose(config: &ServerConfig, plugins: Vec<Arc<PluginProxy>>) -> DispatchResult<Self> {
        let workspace = Arc::new(InMemoryWorkspace::new());
        let buffer = Arc::new(UpdateBufferInterceptor::new(workspace.clone()));

        // Configured project systems first, then one per plugin.
        let mut systems: Vec<Arc<dyn ProjectSystem>> = config
            .project_systems
            .iter()
            .map(|ps| Arc::new(StaticProjectSystem::from(ps)) as Arc<dyn ProjectSystem>)
            .collect();
        systems.extend(
            plugins
                .iter()
                .map(|p| Arc::clone(p) as Arc<dyn ProjectSystem>),
        );

        let registry = plugins.iter().fold(
            CapabilityRegistry::builder().register::<UpdateBuffer>(
                WILDCARD_LANGUAGE,
                Arc::new(UpdateBufferService::new(Arc::clone(&buffer))),
            ),
            |builder, proxy| builder.plugin(Arc::clone(proxy)),
        );

        let registry = Arc::new(registry.build());
        let router = RouterBuilder::new(
            Arc::clone(&registry),
            Arc::new(ProjectSystemPredicate::new(systems)),
            buffer,
            DispatchSettings::from(config),
        )
        .with_standard_endpoints()
        .build()?;

        workspace.mark_initialized();

        Ok(Self {
            router: Arc::new(router),
            workspace,
            registry,
            plugins,
            limits: HostLimits::from(config),
        })
    }

    pub fn host(&self) -> StdioHost {
        StdioHost::new(
            Arc::clone(&self.router),
            self.workspace.clone(),
            self.limits,
        )
    }

    pub async fn shutdown(&self) {
        for plugin in &self.plugins {
            plugin.shutdown().await;
        }
    }
}
