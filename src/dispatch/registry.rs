//! Capability registry
//!
//! The master list of (endpoint, language, handler) triples, filled once at
//! startup through [`RegistryBuilder`] and read by every endpoint handler.
//! Iteration order is registration order.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::handler::{ExportHandler, RequestHandler, handler_fn};
use crate::models::endpoint::Endpoint;
use crate::plugin::PluginProxy;

/// Language tag for handlers that serve every language.
pub const WILDCARD_LANGUAGE: &str = "*";

enum Entry {
    Handler {
        endpoint: &'static str,
        language: String,
        /// Holds an `Arc<dyn RequestHandler<E>>` for the endpoint's type.
        handler: Arc<dyn Any + Send + Sync>,
    },
    Plugin(Arc<PluginProxy>),
}

/// Untyped view of one registration, as returned by [`CapabilityRegistry::lookup`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub language: String,
    /// `None` for in-process handlers, else the plugin name.
    pub plugin: Option<String>,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Vec<Entry>,
}

impl CapabilityRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All registrations for an endpoint, unfiltered. Empty when nothing
    /// serves it.
    pub fn lookup(&self, endpoint: &str) -> Vec<Registration> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Handler {
                    endpoint: name,
                    language,
                    ..
                } if name.eq_ignore_ascii_case(endpoint) => Some(Registration {
                    language: language.clone(),
                    plugin: None,
                }),
                Entry::Plugin(proxy) if proxy.supports(endpoint) => Some(Registration {
                    language: proxy.descriptor().language.clone(),
                    plugin: Some(proxy.name().to_string()),
                }),
                _ => None,
            })
            .collect()
    }

    /// Typed registrations for `E`, in-process handlers and plugins merged in
    /// registration order.
    pub fn handlers_for<E: Endpoint>(&self) -> Vec<(String, ExportHandler<E>)> {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Handler {
                    endpoint,
                    language,
                    handler,
                } if endpoint.eq_ignore_ascii_case(E::NAME) => {
                    match handler.downcast_ref::<Arc<dyn RequestHandler<E>>>() {
                        Some(handler) => {
                            Some((language.clone(), ExportHandler::InProcess(Arc::clone(handler))))
                        }
                        None => {
                            tracing::warn!(
                                "Handler for {} ({}) has a mismatched payload type, skipping",
                                E::NAME,
                                language
                            );
                            None
                        }
                    }
                }
                Entry::Plugin(proxy) if proxy.supports(E::NAME) => Some((
                    proxy.descriptor().language.clone(),
                    ExportHandler::Plugin(Arc::clone(proxy)),
                )),
                _ => None,
            })
            .collect()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &Arc<PluginProxy>> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Plugin(proxy) => Some(proxy),
            Entry::Handler { .. } => None,
        })
    }

    pub fn plugins_for<'a>(&'a self, endpoint: &'a str) -> impl Iterator<Item = &'a Arc<PluginProxy>> {
        self.plugins().filter(move |proxy| proxy.supports(endpoint))
    }

}

#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    pub fn register<E: Endpoint>(
        mut self,
        language: impl Into<String>,
        handler: Arc<dyn RequestHandler<E>>,
    ) -> Self {
        let language = language.into();
        tracing::debug!("Registering {} handler for {}", language, E::NAME);
        self.entries.push(Entry::Handler {
            endpoint: E::NAME,
            language,
            handler: Arc::new(handler),
        });
        self
    }

    pub fn register_fn<E, F, Fut>(self, language: impl Into<String>, f: F) -> Self
    where
        E: Endpoint,
        F: Fn(E::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<E::Response>>> + Send + 'static,
    {
        self.register::<E>(language, handler_fn::<E, F, Fut>(f))
    }

    pub fn plugin(mut self, proxy: Arc<PluginProxy>) -> Self {
        tracing::debug!(
            "Registering plugin {} ({}) for {:?}",
            proxy.name(),
            proxy.descriptor().language,
            proxy.descriptor().endpoints
        );
        self.entries.push(Entry::Plugin(proxy));
        self
    }

    pub fn build(self) -> CapabilityRegistry {
        CapabilityRegistry {
            entries: self.entries,
        }
    }
}
