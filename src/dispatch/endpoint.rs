//! Per-endpoint dispatch engine
//!
//! An [`EndpointHandler`] owns the routing for one endpoint. Each call
//! resolves a language, picks the handlers for it and either runs the single
//! handler, fans out to the group, or broadcasts to every language group.
//! Fan-out results are always combined in registration order, never in
//! completion order.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::aggregate::{PluginFailureMode, collect_contributions, first_useful, fold_merge};
use super::buffer::UpdateBufferInterceptor;
use super::handler::ExportHandler;
use super::registry::{CapabilityRegistry, WILDCARD_LANGUAGE};
use super::resolver::{PredicateHandler, Resolution, resolve_language};
use crate::config::DispatchSettings;
use crate::error::{DispatchError, DispatchResult};
use crate::models::endpoint::{Endpoint, EndpointDescriptor, names};
use crate::models::request::{RequestModel, RoutingHints};
use crate::models::response::{MergePolicy, ResponseModel};

/// Object-safe face of an [`EndpointHandler`], used by the router.
#[async_trait]
pub trait EndpointDispatch: Send + Sync {
    fn descriptor(&self) -> EndpointDescriptor;

    /// Startup check of the endpoint's routing contract.
    fn validate(&self) -> DispatchResult<()>;

    /// Decode leniently, dispatch, and encode the result. A missing answer
    /// encodes as `null`.
    async fn handle_value(&self, payload: Value, cancel: &CancellationToken)
    -> DispatchResult<Value>;
}

struct LanguageGroup<E: Endpoint> {
    language: String,
    handlers: Vec<ExportHandler<E>>,
}

/// Handlers grouped by language, groups in first-registration order.
struct HandlerMap<E: Endpoint> {
    groups: Vec<LanguageGroup<E>>,
}

impl<E: Endpoint> HandlerMap<E> {
    fn build(registrations: Vec<(String, ExportHandler<E>)>) -> Self {
        let mut groups: Vec<LanguageGroup<E>> = Vec::new();
        for (language, handler) in registrations {
            match groups
                .iter_mut()
                .find(|g| g.language.eq_ignore_ascii_case(&language))
            {
                Some(group) => group.handlers.push(handler),
                None => groups.push(LanguageGroup {
                    language,
                    handlers: vec![handler],
                }),
            }
        }
        Self { groups }
    }

    fn group(&self, language: &str) -> Option<&LanguageGroup<E>> {
        self.groups
            .iter()
            .find(|g| g.language.eq_ignore_ascii_case(language))
    }

    /// Handlers for a resolved language, followed by the wildcard handlers.
    fn dispatch_set(&self, language: &str) -> Option<Vec<ExportHandler<E>>> {
        let specific = self.group(language);
        let wildcard = if language == WILDCARD_LANGUAGE {
            None
        } else {
            self.group(WILDCARD_LANGUAGE)
        };

        if specific.is_none() && wildcard.is_none() {
            return None;
        }

        Some(
            specific
                .into_iter()
                .chain(wildcard)
                .flat_map(|g| g.handlers.iter().cloned())
                .collect(),
        )
    }
}

/// Dispatch shape chosen for one call.
enum Plan<E: Endpoint> {
    Single(String, ExportHandler<E>),
    FanOut(String, Vec<ExportHandler<E>>),
    Broadcast,
}

pub struct EndpointHandler<E: Endpoint> {
    registry: Arc<CapabilityRegistry>,
    predicate: Arc<dyn PredicateHandler>,
    buffer: Arc<UpdateBufferInterceptor>,
    settings: DispatchSettings,
    handlers: OnceLock<HandlerMap<E>>,
}

impl<E: Endpoint> EndpointHandler<E> {
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
            handlers: OnceLock::new(),
        }
    }

    fn handlers(&self) -> &HandlerMap<E> {
        self.handlers.get_or_init(|| {
            let map = HandlerMap::build(self.registry.handlers_for::<E>());
            tracing::debug!(
                "{}: {} handler group(s) [{}]",
                E::NAME,
                map.groups.len(),
                map.groups
                    .iter()
                    .map(|g| g.language.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            map
        })
    }

    fn plugin_failure_mode(&self) -> PluginFailureMode {
        if self.settings.degrades_plugin_failures() {
            PluginFailureMode::Drop
        } else {
            PluginFailureMode::Propagate
        }
    }

    /// Dispatch a decoded request. `hints` come from the raw payload.
    pub async fn handle(
        &self,
        request: E::Request,
        hints: &RoutingHints,
        cancel: &CancellationToken,
    ) -> DispatchResult<Option<E::Response>> {
        if E::NAME != names::UPDATE_BUFFER
            && let Some(document) = request.document()
            && document.touches_buffer()
        {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
                applied = self.buffer.apply(document) => { applied?; }
            }
        }

        let descriptor = E::descriptor();
        let resolution = resolve_language(&descriptor, hints, self.predicate.as_ref());
        tracing::debug!("{}: resolved {:?}", E::NAME, resolution);

        match self.plan(&descriptor, resolution)? {
            Plan::Single(language, handler) => {
                tracing::debug!("{}: single dispatch to {} ({})", E::NAME, language, handler.origin());
                invoke(&handler, &language, &request, cancel).await
            }
            Plan::FanOut(language, handlers) => {
                tracing::debug!(
                    "{}: fan-out to {} handlers for {}",
                    E::NAME,
                    handlers.len(),
                    language
                );
                self.fan_out(&language, &handlers, &request, cancel).await
            }
            Plan::Broadcast => self.broadcast(&request, cancel).await,
        }
    }

    fn plan(&self, descriptor: &EndpointDescriptor, resolution: Resolution) -> DispatchResult<Plan<E>> {
        let mergeable = descriptor.mergeable;

        let (language, explicit) = match resolution {
            Resolution::Explicit(language) => (language, true),
            Resolution::Inferred(language) => (language, false),
            Resolution::Unresolved if mergeable => return Ok(Plan::Broadcast),
            Resolution::Unresolved if descriptor.is_unscoped() => {
                return Err(DispatchError::aggregation(E::NAME));
            }
            Resolution::Unresolved => match &self.settings.default_language {
                Some(default) => {
                    tracing::debug!("{}: defaulting to {}", E::NAME, default);
                    (default.clone(), true)
                }
                None => return Err(DispatchError::aggregation(E::NAME)),
            },
        };

        match self.handlers().dispatch_set(&language) {
            Some(mut handlers) if handlers.len() == 1 => {
                let handler = handlers.remove(0);
                Ok(Plan::Single(language, handler))
            }
            Some(handlers) => Ok(Plan::FanOut(language, handlers)),
            None if mergeable && !explicit => {
                tracing::debug!("{}: no {} handlers, broadcasting", E::NAME, language);
                Ok(Plan::Broadcast)
            }
            None => Err(DispatchError::no_handler(E::NAME, &language)),
        }
    }

    async fn fan_out(
        &self,
        language: &str,
        handlers: &[ExportHandler<E>],
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<Option<E::Response>> {
        match <E::Response as ResponseModel>::merge_policy() {
            MergePolicy::Aggregate(merge) => {
                self.merge_group(merge, language, handlers, request, cancel)
                    .await
            }
            MergePolicy::FirstUseful => {
                let outcomes = run_all(language, handlers, request, cancel).await;
                // A failed plugin is just one less candidate answer here.
                let contributions =
                    collect_contributions(E::NAME, outcomes, PluginFailureMode::Drop)?;
                Ok(first_useful(contributions))
            }
        }
    }

    async fn merge_group(
        &self,
        merge: fn(E::Response, Option<E::Response>) -> E::Response,
        language: &str,
        handlers: &[ExportHandler<E>],
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<Option<E::Response>> {
        let outcomes = run_all(language, handlers, request, cancel).await;
        let contributions = collect_contributions(E::NAME, outcomes, self.plugin_failure_mode())?;
        Ok(fold_merge(merge, contributions))
    }

    async fn broadcast(
        &self,
        request: &E::Request,
        cancel: &CancellationToken,
    ) -> DispatchResult<Option<E::Response>> {
        let MergePolicy::Aggregate(merge) = <E::Response as ResponseModel>::merge_policy() else {
            return Err(DispatchError::aggregation(E::NAME));
        };

        let groups = &self.handlers().groups;
        if groups.is_empty() {
            return Err(DispatchError::no_handler(E::NAME, WILDCARD_LANGUAGE));
        }

        tracing::debug!("{}: broadcast to {} language group(s)", E::NAME, groups.len());

        let per_language = join_all(groups.iter().map(|group| {
            self.merge_group(merge, &group.language, &group.handlers, request, cancel)
        }))
        .await;

        let merged = per_language
            .into_iter()
            .collect::<DispatchResult<Vec<_>>>()?;
        Ok(fold_merge(merge, merged))
    }

    /// Fails when the endpoint could only ever broadcast a response that
    /// cannot be merged.
    pub fn validate(&self) -> DispatchResult<()> {
        let descriptor = E::descriptor();
        if !descriptor.mergeable
            && descriptor.is_unscoped()
            && self.predicate.language_for_path("").is_none()
        {
            return Err(DispatchError::aggregation(E::NAME));
        }
        Ok(())
    }
}

async fn run_all<E: Endpoint>(
    language: &str,
    handlers: &[ExportHandler<E>],
    request: &E::Request,
    cancel: &CancellationToken,
) -> Vec<(String, DispatchResult<Option<E::Response>>)> {
    join_all(handlers.iter().map(|handler| async move {
        let outcome = invoke(handler, language, request, cancel).await;
        (handler.origin().to_string(), outcome)
    }))
    .await
}

async fn invoke<E: Endpoint>(
    handler: &ExportHandler<E>,
    language: &str,
    request: &E::Request,
    cancel: &CancellationToken,
) -> DispatchResult<Option<E::Response>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DispatchError::Cancelled),
        outcome = handler.invoke(language, request, cancel) => outcome,
    }
}

#[async_trait]
impl<E: Endpoint> EndpointDispatch for EndpointHandler<E> {
    fn descriptor(&self) -> EndpointDescriptor {
        E::descriptor()
    }

    fn validate(&self) -> DispatchResult<()> {
        EndpointHandler::validate(self)
    }

    async fn handle_value(
        &self,
        payload: Value,
        cancel: &CancellationToken,
    ) -> DispatchResult<Value> {
        let hints = RoutingHints::inspect(&payload);
        let request = match serde_json::from_value::<E::Request>(payload) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("{}: {}, using defaults", E::NAME, DispatchError::RequestDecode(e));
                <E::Request as Default>::default()
            }
        };

        let response = self.handle(request, &hints, cancel).await?;
        Ok(serde_json::to_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler::handler_fn;
    use crate::dispatch::resolver::{ProjectSystemPredicate, StaticPredicate, StaticProjectSystem};
    use crate::error::PluginError;
    use crate::models::config::{PluginDescriptor, PluginFailurePolicy};
    use crate::models::endpoint::{
        CodeCheck, FindSymbols, GotoDefinition, Metadata, WorkspaceInformation,
    };
    use crate::models::request::{
        DocumentRequest, FindSymbolsRequest, LinePositionSpanTextChange, MetadataRequest,
        WorkspaceInformationRequest,
    };
    use crate::models::response::{
        Aggregate, GotoDefinitionResponse, MetadataResponse, QuickFix, QuickFixResponse,
        WorkspaceInformationResponse,
    };
    use crate::plugin::PluginProxy;
    use crate::plugin::channel::tests::scripted_plugin;
    use crate::workspace::{InMemoryWorkspace, Workspace};
    use std::time::Duration;

    fn fixes(text: &str) -> QuickFixResponse {
        QuickFixResponse::new(vec![QuickFix::new("a.cs", 0, 0, text)])
    }

    fn predicate() -> Arc<dyn PredicateHandler> {
        Arc::new(ProjectSystemPredicate::new(vec![
            Arc::new(StaticProjectSystem::new("MSBuild", "csharp", [".cs"])),
            Arc::new(StaticProjectSystem::new("Fsi", "fsharp", [".fs"])),
        ]))
    }

    fn buffer() -> Arc<UpdateBufferInterceptor> {
        Arc::new(UpdateBufferInterceptor::new(Arc::new(InMemoryWorkspace::new())))
    }

    fn engine<E: Endpoint>(registry: CapabilityRegistry) -> EndpointHandler<E> {
        EndpointHandler::new(Arc::new(registry), predicate(), buffer(), DispatchSettings::default())
    }

    /// Returns `response` after a delay, so completion order differs from
    /// registration order.
    fn delayed<E: Endpoint>(
        millis: u64,
        response: Option<E::Response>,
    ) -> Arc<dyn crate::dispatch::handler::RequestHandler<E>>
    where
        E::Response: Clone,
    {
        handler_fn::<E, _, _>(move |_| {
            let response = response.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(response)
            }
        })
    }

    fn failing_plugin(name: &str, language: &str, endpoint: &str) -> Arc<PluginProxy> {
        let channel = scripted_plugin(name, |req| Some(req.reply(0).failed("crashed")));
        let descriptor =
            PluginDescriptor::new(name, "unused", language).with_endpoints([endpoint]);
        Arc::new(PluginProxy::new(descriptor, channel, Duration::from_secs(5)))
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_fan_out_merges_in_registration_order_despite_jitter() {
        let registry = CapabilityRegistry::builder()
            .register::<FindSymbols>("csharp", delayed::<FindSymbols>(40, Some(fixes("first"))))
            .register::<FindSymbols>("CSharp", delayed::<FindSymbols>(0, Some(fixes("second"))))
            .register::<FindSymbols>("csharp", delayed::<FindSymbols>(20, Some(fixes("third"))))
            .build();
        let handler = engine::<FindSymbols>(registry);

        let request = FindSymbolsRequest {
            language: Some("csharp".into()),
            ..Default::default()
        };
        let hints = RoutingHints::inspect(&serde_json::json!({"Language": "csharp"}));

        let mut outputs = Vec::new();
        for _ in 0..3 {
            let response = handler
                .handle(request.clone(), &hints, &token())
                .await
                .unwrap()
                .unwrap();
            outputs.push(serde_json::to_vec(&response).unwrap());
            assert_eq!(response.texts(), vec!["first", "second", "third"]);
        }
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_broadcast_merges_language_groups() {
        let registry = CapabilityRegistry::builder()
            .register::<WorkspaceInformation>(
                "csharp",
                delayed::<WorkspaceInformation>(
                    30,
                    Some(WorkspaceInformationResponse::single("MsBuild", serde_json::json!({"Projects": 2}))),
                ),
            )
            .register::<WorkspaceInformation>(
                "fsharp",
                delayed::<WorkspaceInformation>(
                    0,
                    Some(WorkspaceInformationResponse::single("Fsi", serde_json::json!({"Scripts": 1}))),
                ),
            )
            .build();
        let handler = engine::<WorkspaceInformation>(registry);

        let response = handler
            .handle(WorkspaceInformationRequest::default(), &RoutingHints::default(), &token())
            .await
            .unwrap()
            .unwrap();

        let expected = WorkspaceInformationResponse::single("MsBuild", serde_json::json!({"Projects": 2}))
            .merge(Some(WorkspaceInformationResponse::single("Fsi", serde_json::json!({"Scripts": 1}))));
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn test_static_predicate_routes_unscoped_endpoint() {
        let registry = CapabilityRegistry::builder()
            .register::<WorkspaceInformation>(
                "Projects",
                delayed::<WorkspaceInformation>(0, Some(WorkspaceInformationResponse::single("MsBuild", Value::Null))),
            )
            .register::<WorkspaceInformation>(
                "fsharp",
                delayed::<WorkspaceInformation>(0, Some(WorkspaceInformationResponse::single("Fsi", Value::Null))),
            )
            .build();
        let handler = EndpointHandler::<WorkspaceInformation>::new(
            Arc::new(registry),
            Arc::new(StaticPredicate::new("Projects")),
            buffer(),
            DispatchSettings::default(),
        );

        let response = handler
            .handle(WorkspaceInformationRequest::default(), &RoutingHints::default(), &token())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.0.keys().collect::<Vec<_>>(), vec!["MsBuild"]);
    }

    #[tokio::test]
    async fn test_no_handler_for_language() {
        let registry = CapabilityRegistry::builder()
            .register::<GotoDefinition>(
                "csharp",
                delayed::<GotoDefinition>(0, Some(GotoDefinitionResponse::at("a.cs", 1, 1))),
            )
            .build();
        let predicate: Arc<dyn PredicateHandler> = Arc::new(ProjectSystemPredicate::new(vec![
            Arc::new(StaticProjectSystem::new("MSBuild", "csharp", [".cs"])),
            Arc::new(StaticProjectSystem::new("VbProj", "vb", [".vb"])),
        ]));
        let handler = EndpointHandler::<GotoDefinition>::new(
            Arc::new(registry),
            predicate,
            buffer(),
            DispatchSettings::default(),
        );

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "Module.vb"}));
        let err = handler
            .handle(DocumentRequest::for_file("Module.vb"), &hints, &token())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NoHandlerForLanguage { ref language, ref endpoint }
                if language == "vb" && endpoint == names::GOTO_DEFINITION
        ));
    }

    #[tokio::test]
    async fn test_single_handler_returns_empty_response_unchanged() {
        let registry = CapabilityRegistry::builder()
            .register::<GotoDefinition>(
                "csharp",
                delayed::<GotoDefinition>(0, Some(GotoDefinitionResponse::default())),
            )
            .build();
        let handler = engine::<GotoDefinition>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.cs"}));
        let response = handler
            .handle(DocumentRequest::for_file("a.cs"), &hints, &token())
            .await
            .unwrap();
        assert_eq!(response, Some(GotoDefinitionResponse::default()));
    }

    #[tokio::test]
    async fn test_first_useful_answer_ignores_completion_order() {
        let registry = CapabilityRegistry::builder()
            .register::<GotoDefinition>(
                "csharp",
                delayed::<GotoDefinition>(0, Some(GotoDefinitionResponse::default())),
            )
            .register::<GotoDefinition>(
                "csharp",
                delayed::<GotoDefinition>(40, Some(GotoDefinitionResponse::at("b.cs", 7, 2))),
            )
            .register::<GotoDefinition>(
                "csharp",
                delayed::<GotoDefinition>(10, Some(GotoDefinitionResponse::default())),
            )
            .build();
        let handler = engine::<GotoDefinition>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.cs"}));
        let response = handler
            .handle(DocumentRequest::for_file("a.cs"), &hints, &token())
            .await
            .unwrap();
        assert_eq!(response, Some(GotoDefinitionResponse::at("b.cs", 7, 2)));
    }

    #[tokio::test]
    async fn test_default_language_for_legacy_request() {
        let registry = CapabilityRegistry::builder()
            .register::<Metadata>(
                "csharp",
                delayed::<Metadata>(
                    0,
                    Some(MetadataResponse {
                        source_name: Some("System.String".into()),
                        source: None,
                    }),
                ),
            )
            .build();
        let handler = engine::<Metadata>(registry);

        let response = handler
            .handle(MetadataRequest::default(), &RoutingHints::default(), &token())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.source_name.as_deref(), Some("System.String"));
    }

    #[tokio::test]
    async fn test_legacy_request_without_default_language() {
        let handler = EndpointHandler::<Metadata>::new(
            Arc::new(CapabilityRegistry::builder().build()),
            predicate(),
            buffer(),
            DispatchSettings::default().with_default_language(None),
        );
        let err = handler
            .handle(MetadataRequest::default(), &RoutingHints::default(), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::AggregationContractViolation { .. }));
    }

    #[tokio::test]
    async fn test_unknown_inferred_language_falls_back_to_broadcast() {
        let registry = CapabilityRegistry::builder()
            .register::<CodeCheck>("csharp", delayed::<CodeCheck>(0, Some(fixes("cs"))))
            .register::<CodeCheck>("fsharp", delayed::<CodeCheck>(0, Some(fixes("fs"))))
            .build();
        let predicate: Arc<dyn PredicateHandler> = Arc::new(ProjectSystemPredicate::new(vec![
            Arc::new(StaticProjectSystem::new("Vb", "vb", [".vb"])),
        ]));
        let handler = EndpointHandler::<CodeCheck>::new(
            Arc::new(registry),
            predicate,
            buffer(),
            DispatchSettings::default(),
        );

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.vb"}));
        let response = handler
            .handle(DocumentRequest::for_file("a.vb"), &hints, &token())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.texts(), vec!["cs", "fs"]);
    }

    #[tokio::test]
    async fn test_explicit_unknown_language_is_an_error_even_when_mergeable() {
        let registry = CapabilityRegistry::builder()
            .register::<FindSymbols>("csharp", delayed::<FindSymbols>(0, Some(fixes("cs"))))
            .build();
        let handler = engine::<FindSymbols>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"Language": "vb"}));
        let err = handler
            .handle(FindSymbolsRequest::default(), &hints, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHandlerForLanguage { .. }));
    }

    #[tokio::test]
    async fn test_broadcast_over_empty_registry() {
        let handler = engine::<FindSymbols>(CapabilityRegistry::builder().build());
        let err = handler
            .handle(FindSymbolsRequest::default(), &RoutingHints::default(), &token())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NoHandlerForLanguage { ref language, .. } if language == "*"
        ));
    }

    #[tokio::test]
    async fn test_wildcard_handlers_join_language_group() {
        let registry = CapabilityRegistry::builder()
            .register::<CodeCheck>(WILDCARD_LANGUAGE, delayed::<CodeCheck>(0, Some(fixes("any"))))
            .register::<CodeCheck>("csharp", delayed::<CodeCheck>(30, Some(fixes("cs"))))
            .build();
        let handler = engine::<CodeCheck>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.cs"}));
        let response = handler
            .handle(DocumentRequest::for_file("a.cs"), &hints, &token())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.texts(), vec!["cs", "any"]);
    }

    #[tokio::test]
    async fn test_in_process_failure_fails_aggregate() {
        let registry = CapabilityRegistry::builder()
            .register::<CodeCheck>("csharp", delayed::<CodeCheck>(0, Some(fixes("cs"))))
            .register_fn::<CodeCheck, _, _>("csharp", |_: DocumentRequest| async {
                anyhow::bail!("analyzer crashed")
            })
            .build();
        let handler = engine::<CodeCheck>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.cs"}));
        let err = handler
            .handle(DocumentRequest::for_file("a.cs"), &hints, &token())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::HandlerExecution { .. }));
    }

    #[tokio::test]
    async fn test_plugin_failure_policy_in_fan_out() {
        let build = |policy| {
            let registry = CapabilityRegistry::builder()
                .register::<CodeCheck>("fsharp", delayed::<CodeCheck>(0, Some(fixes("local"))))
                .plugin(failing_plugin("fsac", "fsharp", names::CODE_CHECK))
                .build();
            EndpointHandler::<CodeCheck>::new(
                Arc::new(registry),
                predicate(),
                buffer(),
                DispatchSettings::default().with_plugin_failure(policy),
            )
        };
        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.fs"}));

        let err = build(PluginFailurePolicy::Fail)
            .handle(DocumentRequest::for_file("a.fs"), &hints, &token())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::PluginCommunication { source: PluginError::Remote(_), .. }
        ));

        let degraded = build(PluginFailurePolicy::Degrade)
            .handle(DocumentRequest::for_file("a.fs"), &hints, &token())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(degraded.texts(), vec!["local"]);
    }

    #[tokio::test]
    async fn test_sole_plugin_failure_surfaces() {
        let registry = CapabilityRegistry::builder()
            .plugin(failing_plugin("fsac", "fsharp", names::CODE_CHECK))
            .build();
        let handler = EndpointHandler::<CodeCheck>::new(
            Arc::new(registry),
            predicate(),
            buffer(),
            DispatchSettings::default().with_plugin_failure(PluginFailurePolicy::Degrade),
        );

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.fs"}));
        let err = handler
            .handle(DocumentRequest::for_file("a.fs"), &hints, &token())
            .await
            .unwrap_err();
        assert!(err.is_plugin_failure());
    }

    #[tokio::test]
    async fn test_plugin_failure_is_absent_answer_for_first_useful() {
        let registry = CapabilityRegistry::builder()
            .plugin(failing_plugin("fsac", "fsharp", names::GOTO_DEFINITION))
            .register::<GotoDefinition>(
                "fsharp",
                delayed::<GotoDefinition>(0, Some(GotoDefinitionResponse::at("b.fs", 1, 1))),
            )
            .build();
        let handler = engine::<GotoDefinition>(registry);

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.fs"}));
        let response = handler
            .handle(DocumentRequest::for_file("a.fs"), &hints, &token())
            .await
            .unwrap();
        assert_eq!(response, Some(GotoDefinitionResponse::at("b.fs", 1, 1)));
    }

    #[tokio::test]
    async fn test_cancellation_completes_promptly() {
        let registry = CapabilityRegistry::builder()
            .register::<CodeCheck>("csharp", delayed::<CodeCheck>(60_000, Some(fixes("slow"))))
            .build();
        let handler = engine::<CodeCheck>(registry);

        let cancel = token();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let hints = RoutingHints::inspect(&serde_json::json!({"FileName": "a.cs"}));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            handler.handle(DocumentRequest::for_file("a.cs"), &hints, &cancel),
        )
        .await
        .expect("dispatch should not hang");
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_buffer_is_applied_before_handler_runs() {
        let workspace = Arc::new(InMemoryWorkspace::new());
        workspace
            .apply("a.cs", crate::workspace::BufferEdit::Replace("class A {}".into()))
            .await
            .unwrap();

        let observed = workspace.clone();
        let registry = CapabilityRegistry::builder()
            .register::<CodeCheck>(
                "csharp",
                handler_fn::<CodeCheck, _, _>(move |req: DocumentRequest| {
                    let workspace = observed.clone();
                    async move {
                        let path = req.file_name.unwrap_or_default();
                        let text = workspace.document(&path).await.unwrap_or_default();
                        Ok(Some(QuickFixResponse::new(vec![QuickFix::new(path, 0, 0, text)])))
                    }
                }),
            )
            .build();
        let handler = EndpointHandler::<CodeCheck>::new(
            Arc::new(registry),
            predicate(),
            Arc::new(UpdateBufferInterceptor::new(workspace.clone())),
            DispatchSettings::default(),
        );

        let request = DocumentRequest::for_file("a.cs").with_changes(vec![
            LinePositionSpanTextChange::new((0, 6), (0, 7), "Renamed"),
        ]);
        let hints = RoutingHints::inspect(&serde_json::to_value(&request).unwrap());
        let response = handler.handle(request, &hints, &token()).await.unwrap().unwrap();
        assert_eq!(response.texts(), vec!["class Renamed {}"]);
    }

    #[tokio::test]
    async fn test_garbage_payload_decodes_to_default_request() {
        let registry = CapabilityRegistry::builder()
            .register_fn::<FindSymbols, _, _>("csharp", |req: FindSymbolsRequest| async move {
                assert_eq!(req, FindSymbolsRequest::default());
                Ok(Some(QuickFixResponse::default()))
            })
            .build();
        let handler = engine::<FindSymbols>(registry);

        let value = handler
            .handle_value(serde_json::json!("\u{0}garbage"), &token())
            .await
            .unwrap();
        assert_eq!(value, serde_json::json!({"QuickFixes": []}));
    }

    #[test]
    fn test_validate_rejects_unroutable_non_mergeable_endpoint() {
        struct Unscoped;
        impl Endpoint for Unscoped {
            const NAME: &'static str = "/unscoped";
            type Request = WorkspaceInformationRequest;
            type Response = GotoDefinitionResponse;
        }

        let handler = engine::<Unscoped>(CapabilityRegistry::builder().build());
        assert!(matches!(
            handler.validate(),
            Err(DispatchError::AggregationContractViolation { .. })
        ));

        let routed = EndpointHandler::<Unscoped>::new(
            Arc::new(CapabilityRegistry::builder().build()),
            Arc::new(StaticPredicate::new("Projects")),
            buffer(),
            DispatchSettings::default(),
        );
        assert!(routed.validate().is_ok());
    }
}
