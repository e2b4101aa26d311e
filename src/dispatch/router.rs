//! Endpoint lookup by name
//!
//! The transport-facing entry point: raw request bytes in, raw response
//! bytes out.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::buffer::UpdateBufferInterceptor;
use super::endpoint::{EndpointDispatch, EndpointHandler};
use super::registry::CapabilityRegistry;
use super::resolver::{PredicateHandler, StaticPredicate};
use crate::config::DispatchSettings;
use crate::error::{DispatchError, DispatchResult};
use crate::models::endpoint::{
    CodeCheck, Endpoint, EndpointDescriptor, FindSymbols, FindUsages, GotoDefinition, Metadata,
    UpdateBuffer, WorkspaceInformation,
};

/// Language served by workspace-information endpoints.
pub const PROJECTS_LANGUAGE: &str = "Projects";

pub struct EndpointRouter {
    endpoints: Vec<Arc<dyn EndpointDispatch>>,
    by_name: HashMap<String, usize>,
}

impl EndpointRouter {
    pub fn get(&self, name: &str) -> Option<&Arc<dyn EndpointDispatch>> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.endpoints[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    pub fn descriptors(&self) -> Vec<EndpointDescriptor> {
        self.endpoints.iter().map(|e| e.descriptor()).collect()
    }

    /// Dispatch raw bytes. Empty or undecodable bytes are treated as an
    /// empty payload.
    pub async fn invoke(
        &self,
        name: &str,
        request: &[u8],
        cancel: &CancellationToken,
    ) -> DispatchResult<Vec<u8>> {
        let payload = decode_payload(name, request);
        let response = self.dispatch(name, payload, cancel).await?;
        Ok(serde_json::to_vec(&response)?)
    }

    pub async fn dispatch(
        &self,
        name: &str,
        payload: Value,
        cancel: &CancellationToken,
    ) -> DispatchResult<Value> {
        let endpoint = self
            .get(name)
            .ok_or_else(|| DispatchError::UnknownEndpoint(name.to_string()))?;
        endpoint.handle_value(payload, cancel).await
    }
}

fn decode_payload(name: &str, bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("{}: {}, using defaults", name, DispatchError::RequestDecode(e));
            Value::Null
        }
    }
}

pub struct RouterBuilder {
    registry: Arc<CapabilityRegistry>,
    predicate: Arc<dyn PredicateHandler>,
    buffer: Arc<UpdateBufferInterceptor>,
    settings: DispatchSettings,
    endpoints: Vec<Arc<dyn EndpointDispatch>>,
}

impl RouterBuilder {
    /// `predicate` is the default language predicate, normally the project
    /// systems.
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        predicate: Arc<dyn PredicateHandler>,
        buffer: Arc<UpdateBufferInterceptor>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            predicate,
            buffer,
            settings,
            endpoints: Vec::new(),
        }
    }

    pub fn endpoint<E: Endpoint>(self) -> Self {
        let predicate = Arc::clone(&self.predicate);
        self.endpoint_with::<E>(predicate)
    }

    pub fn endpoint_with<E: Endpoint>(mut self, predicate: Arc<dyn PredicateHandler>) -> Self {
        self.endpoints.push(Arc::new(EndpointHandler::<E>::new(
            Arc::clone(&self.registry),
            predicate,
            Arc::clone(&self.buffer),
            self.settings.clone(),
        )));
        self
    }

    pub fn with_standard_endpoints(self) -> Self {
        self.endpoint::<UpdateBuffer>()
            .endpoint::<FindSymbols>()
            .endpoint::<CodeCheck>()
            .endpoint::<FindUsages>()
            .endpoint::<GotoDefinition>()
            .endpoint::<Metadata>()
            .endpoint_with::<WorkspaceInformation>(Arc::new(StaticPredicate::new(PROJECTS_LANGUAGE)))
    }

    pub fn build(self) -> DispatchResult<EndpointRouter> {
        let mut by_name = HashMap::with_capacity(self.endpoints.len());
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let descriptor = endpoint.descriptor();
            endpoint.validate()?;
            if by_name
                .insert(descriptor.name.to_ascii_lowercase(), index)
                .is_some()
            {
                return Err(DispatchError::DuplicateEndpoint(descriptor.name.to_string()));
            }
        }

        tracing::info!("Routing {} endpoint(s)", self.endpoints.len());
        Ok(EndpointRouter {
            endpoints: self.endpoints,
            by_name,
        })
    }
}
