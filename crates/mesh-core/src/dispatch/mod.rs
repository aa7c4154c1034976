//! Endpoint declaration and request dispatch.
//!
//! Plugins declare what they answer with an [`EndpointsBuilder`]; the runtime
//! binds every plugin's [`Endpoints`] into one [`DispatchTable`] that the
//! reader thread consults for each inbound request.

pub mod endpoint;
pub mod table;

pub use endpoint::{Context, EndpointSpec, Endpoints, EndpointsBuilder, HandlerFuture};
pub use table::{BindReport, DispatchTable};
