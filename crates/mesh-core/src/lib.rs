//! Mesh Core - plugin-side runtime for the assistant device mesh.
//!
//! A plugin process connects to the coordinator over TCP, announces the calls
//! it answers, and then exchanges length-prefixed JSON messages. This crate
//! provides the message model, the wire codec, the reader/writer transport,
//! reply correlation, endpoint dispatch and the runtime loop tying them
//! together.
//!
//! Concrete plugins live in the `mesh-plugins` crate; the `mesh-loader`
//! binary picks one by name and runs it.
//!
//! # Example
//!
//! ```rust,ignore
//! use mesh_core::{endpoint, Context, EndpointsBuilder, Plugin, PluginRuntime, RuntimeConfig};
//!
//! struct Storyteller;
//!
//! impl Storyteller {
//!     async fn tell_story(&self, _req: Payload, _ctx: &Context) -> anyhow::Result<Story> {
//!         Ok(Story { text: "Once upon a time".into() })
//!     }
//! }
//!
//! #[async_trait::async_trait]
//! impl Plugin for Storyteller {
//!     fn name(&self) -> &str {
//!         "storyteller"
//!     }
//!
//!     fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
//!         endpoint!(b, Storyteller::tell_story)
//!     }
//! }
//!
//! fn main() -> mesh_core::Result<()> {
//!     let runtime = PluginRuntime::builder(RuntimeConfig::default())
//!         .plugin(Storyteller)
//!         .build()?;
//!     let report = runtime.run()?;
//!     println!("stopped: {:?}", report.reason);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod ipc;
pub mod message;
pub mod plugin;
pub mod plugins;
pub mod runtime;
pub mod shutdown;

// Re-export commonly used types
pub use config::{LifecycleConfig, RuntimeConfig, TransportConfig};
pub use dispatch::{BindReport, Context, DispatchTable, EndpointSpec, Endpoints, EndpointsBuilder};
pub use error::{CodecError, DeclarationError, MeshError, Result};
pub use ipc::{CommChannel, Continuation};
pub use message::{Call, ControlCall, Message, Payload, Route};
pub use plugin::Plugin;
pub use plugins::{PluginSettings, PluginSettingsLoader};
pub use runtime::{
    PluginRuntime, PluginRuntimeBuilder, RetryPolicy, RetryStats, RunReport, RuntimeState,
    StopReason,
};
pub use shutdown::ShutdownSignal;

// Plugins implement `Plugin` with this attribute.
pub use async_trait::async_trait;
