//! The plugin contract.

use crate::config::LifecycleConfig;
use crate::dispatch::EndpointsBuilder;
use crate::ipc::comm::CommChannel;
use async_trait::async_trait;

/// A unit of behaviour hosted by a [`PluginRuntime`](crate::runtime::PluginRuntime).
///
/// Plugins answer calls through the endpoints they declare and may drive
/// their own work from [`Plugin::tick`], which the runtime calls once per
/// cycle.
///
/// # Example
///
/// ```ignore
/// struct Fortune;
///
/// impl Fortune {
///     async fn grab_a_message(
///         &self,
///         _req: Empty,
///         _ctx: &Context,
///     ) -> anyhow::Result<FortuneMessage> {
///         Ok(FortuneMessage { message: "Today is a good day".into() })
///     }
/// }
///
/// #[async_trait]
/// impl Plugin for Fortune {
///     fn name(&self) -> &str {
///         "fortune"
///     }
///
///     fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
///         endpoint!(b, Fortune::grab_a_message)
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Role name the runtime announces during the handshake.
    fn name(&self) -> &str;

    /// Declare the calls this plugin type answers. Called once per type.
    fn endpoints(builder: EndpointsBuilder<Self>) -> EndpointsBuilder<Self>
    where
        Self: Sized,
    {
        builder
    }

    /// One unit of plugin-driven work. Returning `false` stops the runtime.
    async fn tick(&self, _comm: &CommChannel) -> bool {
        tokio::time::sleep(LifecycleConfig::DEFAULT_TICK_SLEEP).await;
        true
    }
}
