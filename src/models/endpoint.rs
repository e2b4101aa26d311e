//! Endpoint descriptors and the standard endpoint catalog

use serde::Serialize;

use super::request::{
    DocumentRequest, FindSymbolsRequest, MetadataRequest, RequestModel, UpdateBufferRequest,
    WorkspaceInformationRequest,
};
use super::response::{
    GotoDefinitionResponse, MetadataResponse, QuickFixResponse, ResponseModel,
    WorkspaceInformationResponse,
};

/// One named request/response operation with its payload types fixed at
/// compile time.
pub trait Endpoint: Send + Sync + 'static {
    const NAME: &'static str;
    type Request: RequestModel;
    type Response: ResponseModel;

    fn descriptor() -> EndpointDescriptor {
        EndpointDescriptor {
            name: Self::NAME,
            has_language: <Self::Request as RequestModel>::HAS_LANGUAGE,
            has_file_name: <Self::Request as RequestModel>::HAS_FILE_NAME,
            mergeable: <Self::Response as ResponseModel>::merge_policy().is_mergeable(),
            can_be_empty: <Self::Response as ResponseModel>::CAN_BE_EMPTY,
        }
    }
}

/// Static facts about an endpoint, used for validation and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    pub name: &'static str,
    pub has_language: bool,
    pub has_file_name: bool,
    pub mergeable: bool,
    pub can_be_empty: bool,
}

impl EndpointDescriptor {
    /// Neither routing field is declared, so only a predicate can route it.
    pub fn is_unscoped(&self) -> bool {
        !self.has_language && !self.has_file_name
    }
}

/// Endpoint name constants
pub mod names {
    pub const UPDATE_BUFFER: &str = "/updatebuffer";
    pub const FIND_SYMBOLS: &str = "/findsymbols";
    pub const CODE_CHECK: &str = "/codecheck";
    pub const FIND_USAGES: &str = "/findusages";
    pub const GOTO_DEFINITION: &str = "/gotodefinition";
    pub const METADATA: &str = "/metadata";
    pub const WORKSPACE_INFORMATION: &str = "/projects";

    // Served by the host itself, never routed.
    pub const CHECK_ALIVE_STATUS: &str = "/checkalivestatus";
    pub const CHECK_READY_STATUS: &str = "/checkreadystatus";
    pub const STOP_SERVER: &str = "/stopserver";
}

macro_rules! endpoint {
    ($(#[$meta:meta])* $ty:ident => $name:expr, $req:ty, $resp:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        impl Endpoint for $ty {
            const NAME: &'static str = $name;
            type Request = $req;
            type Response = $resp;
        }
    };
}

endpoint!(
    /// Applies unsaved buffer content to the workspace.
    UpdateBuffer => names::UPDATE_BUFFER, UpdateBufferRequest, bool
);
endpoint!(FindSymbols => names::FIND_SYMBOLS, FindSymbolsRequest, QuickFixResponse);
endpoint!(CodeCheck => names::CODE_CHECK, DocumentRequest, QuickFixResponse);
endpoint!(FindUsages => names::FIND_USAGES, DocumentRequest, QuickFixResponse);
endpoint!(GotoDefinition => names::GOTO_DEFINITION, DocumentRequest, GotoDefinitionResponse);
endpoint!(
    /// Legacy endpoint that editors call without a language.
    Metadata => names::METADATA, MetadataRequest, MetadataResponse
);
endpoint!(
    WorkspaceInformation => names::WORKSPACE_INFORMATION,
    WorkspaceInformationRequest,
    WorkspaceInformationResponse
);
