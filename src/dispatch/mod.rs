//! Request dispatch and aggregation core

pub mod aggregate;
pub mod buffer;
pub mod endpoint;
pub mod handler;
pub mod registry;
pub mod resolver;
pub mod router;

pub use buffer::UpdateBufferInterceptor;
pub use endpoint::{EndpointDispatch, EndpointHandler};
pub use handler::{ExportHandler, RequestHandler, handler_fn};
pub use registry::{CapabilityRegistry, Registration, RegistryBuilder, WILDCARD_LANGUAGE};
pub use resolver::{
    PredicateHandler, ProjectSystem, ProjectSystemPredicate, Resolution, StaticPredicate,
    StaticProjectSystem, resolve_language,
};
pub use router::{EndpointRouter, PROJECTS_LANGUAGE, RouterBuilder};
