//! Handler contract and registrations

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, DispatchResult, PluginError};
use crate::models::endpoint::Endpoint;
use crate::plugin::PluginProxy;

/// An in-process implementation of one endpoint for one language.
///
/// `Ok(None)` means the handler has no answer for this request.
#[async_trait]
pub trait RequestHandler<E: Endpoint>: Send + Sync {
    async fn handle(
        &self,
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Option<E::Response>>;
}

/// Adapts an async closure into a [`RequestHandler`].
pub struct FnHandler<E, F> {
    f: F,
    _endpoint: PhantomData<fn() -> E>,
}

pub fn handler_fn<E, F, Fut>(f: F) -> Arc<dyn RequestHandler<E>>
where
    E: Endpoint,
    F: Fn(E::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<E::Response>>> + Send + 'static,
{
    Arc::new(FnHandler {
        f,
        _endpoint: PhantomData,
    })
}

#[async_trait]
impl<E, F, Fut> RequestHandler<E> for FnHandler<E, F>
where
    E: Endpoint,
    F: Fn(E::Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<E::Response>>> + Send + 'static,
{
    async fn handle(
        &self,
        request: &E::Request,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Option<E::Response>> {
        (self.f)(request.clone()).await
    }
}

/// One registered implementation of an endpoint.
pub enum ExportHandler<E: Endpoint> {
    InProcess(Arc<dyn RequestHandler<E>>),
    Plugin(Arc<PluginProxy>),
}

impl<E: Endpoint> Clone for ExportHandler<E> {
    fn clone(&self) -> Self {
        match self {
            Self::InProcess(h) => Self::InProcess(Arc::clone(h)),
            Self::Plugin(p) => Self::Plugin(Arc::clone(p)),
        }
    }
}

impl<E: Endpoint> ExportHandler<E> {
    pub fn is_plugin(&self) -> bool {
        matches!(self, Self::Plugin(_))
    }

    /// Short label for logs.
    pub fn origin(&self) -> &str {
        match self {
            Self::InProcess(_) => "in-process",
            Self::Plugin(p) => p.name(),
        }
    }

    pub async fn invoke(
        &self,
        language: &str,
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<Option<E::Response>> {
        match self {
            Self::InProcess(handler) => {
                handler
                    .handle(request, cancel)
                    .await
                    .map_err(|e| DispatchError::HandlerExecution {
                        endpoint: E::NAME.to_string(),
                        language: language.to_string(),
                        message: format!("{:#}", e),
                    })
            }
            Self::Plugin(proxy) => match proxy.handle::<E>(request, cancel).await {
                Ok(response) => Ok(response),
                Err(PluginError::Cancelled) => Err(DispatchError::Cancelled),
                Err(e) => Err(DispatchError::plugin(proxy.name(), E::NAME, e)),
            },
        }
    }
}

impl<E: Endpoint> std::fmt::Debug for ExportHandler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess(_) => f.write_str("InProcess"),
            Self::Plugin(p) => f.debug_tuple("Plugin").field(&p.name()).finish(),
        }
    }
}
