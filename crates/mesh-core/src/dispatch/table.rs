//! The dispatch table: exported call name to bound handler.
//!
//! Built once at startup from every plugin's [`Endpoints`] and shared with the
//! reader thread behind an `Arc`. It is never mutated after the runtime starts.

use super::endpoint::{Context, EndpointSpec, Endpoints, HandlerFuture, Invoke};
use crate::ipc::comm::CommChannel;
use crate::message::Message;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

type Bound = Arc<dyn Fn(Message, Context) -> HandlerFuture + Send + Sync>;

struct Entry {
    owner: &'static str,
    spec: EndpointSpec,
    handler: Bound,
}

/// Outcome of binding one plugin's endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindReport {
    pub bound: Vec<String>,
    /// Names already taken by an earlier plugin.
    pub skipped: Vec<String>,
}

/// Call name to handler mapping for one runtime.
#[derive(Default)]
pub struct DispatchTable {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("calls", &self.order)
            .finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `plugin`'s declared endpoints. The first registration of a name wins.
    pub fn bind<P: Send + Sync + 'static>(
        &mut self,
        plugin: Arc<P>,
        endpoints: &Endpoints<P>,
    ) -> BindReport {
        let mut report = BindReport::default();

        for declared in &endpoints.declared {
            let name = declared.spec.name.clone();

            if let Some(existing) = self.entries.get(&name) {
                warn!(
                    "Endpoint `{}` of {} already registered by {}; skipping",
                    name,
                    endpoints.plugin(),
                    existing.owner
                );
                report.skipped.push(name);
                continue;
            }

            let instance = Arc::clone(&plugin);
            let invoke: Invoke<P> = Arc::clone(&declared.invoke);
            let handler: Bound =
                Arc::new(move |msg: Message, ctx: Context| invoke(Arc::clone(&instance), msg, ctx));

            debug!("Bound `{}` to {}", name, endpoints.plugin());
            self.entries.insert(
                name.clone(),
                Entry {
                    owner: endpoints.plugin(),
                    spec: declared.spec.clone(),
                    handler,
                },
            );
            self.order.push(name.clone());
            report.bound.push(name);
        }

        report
    }

    pub fn get(&self, call: &str) -> Option<&EndpointSpec> {
        self.entries.get(call).map(|entry| &entry.spec)
    }

    pub fn contains(&self, call: &str) -> bool {
        self.entries.contains_key(call)
    }

    /// Exported names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Names every bound plugin marked as required.
    pub fn required(&self) -> impl Iterator<Item = &str> {
        self.order
            .iter()
            .filter(|name| self.entries.get(*name).is_some_and(|e| e.spec.required))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepare the handler task for `msg`.
    ///
    /// Gives the message back if no endpoint answers its call. The returned
    /// future sends exactly one reply through `comm` when polled to completion.
    pub fn invoke(
        &self,
        msg: Message,
        comm: &CommChannel,
    ) -> std::result::Result<BoxFuture<'static, ()>, Message> {
        match self.entries.get(&msg.call) {
            Some(entry) => {
                let handler = Arc::clone(&entry.handler);
                Ok(respond(handler, msg, comm.clone()).boxed())
            }
            None => Err(msg),
        }
    }

    /// Run the handler for `msg` to completion on the current task.
    ///
    /// Unknown calls are logged and dropped.
    pub async fn dispatch(&self, msg: Message, comm: &CommChannel) {
        match self.invoke(msg, comm) {
            Ok(task) => task.await,
            Err(msg) => warn!("No endpoint for {}; dropping", msg),
        }
    }
}

async fn respond(handler: Bound, msg: Message, comm: CommChannel) {
    let request = msg.clone();
    let ctx = Context::for_request(&msg, comm.clone());
    debug!("Dispatching {}", request);

    // Calling the handler happens inside the guarded future so a panic while
    // building its future is contained as well.
    let outcome = AssertUnwindSafe(async move { handler(msg, ctx).await })
        .catch_unwind()
        .await;

    let reply = match outcome {
        Ok(Ok(resp)) => request.reply(resp),
        Ok(Err(e)) => {
            warn!("Handler for {} failed: {:#}", request, e);
            let text = format!("{:#}", e);
            request.into_error(text)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!("Handler for {} panicked: {}", request, reason);
            let text = format!("handler for `{}` panicked: {}", request.call, reason);
            request.into_error(text)
        }
    };

    if let Err(e) = comm.send(reply) {
        warn!("Could not queue reply: {}", e);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
