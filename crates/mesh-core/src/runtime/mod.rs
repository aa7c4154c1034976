//! The plugin runtime: connection, handshake, tick loop and shutdown.
//!
//! ```text
//! Connecting -> Handshaking -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! [`PluginRuntime::run`] blocks the calling thread. It owns a current-thread
//! tokio runtime on which the tick loop and every dispatched handler run, while
//! the reader and writer threads move frames on and off the socket.

pub mod connect;

use crate::config::{RuntimeConfig, TransportConfig};
use crate::dispatch::{DispatchTable, Endpoints, EndpointsBuilder};
use crate::error::{DeclarationError, MeshError, Result};
use crate::ipc::comm::CommChannel;
use crate::ipc::protocol::{from_payload, to_payload, HandshakeArgs, HandshakeReply};
use crate::ipc::transport::{Transport, TransportHandle, TransportSettings};
use crate::message::{calls, Message, Route};
use crate::plugin::Plugin;
use crate::shutdown::ShutdownSignal;
use futures::future::join_all;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use connect::{connect_with_retry, retry_blocking, RetryPolicy, RetryStats};

/// Lifecycle state of a [`PluginRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Connecting,
    Handshaking,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RuntimeState::Idle => "idle",
            RuntimeState::Connecting => "connecting",
            RuntimeState::Handshaking => "handshaking",
            RuntimeState::Running => "running",
            RuntimeState::ShuttingDown => "shutting down",
            RuntimeState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why the running loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A plugin's tick returned false.
    PluginFinished,
    ReaderExited,
    WriterExited,
    /// The shutdown signal was raised from outside the transport threads.
    ShutdownSignalled,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub reason: StopReason,
    /// Completed tick cycles.
    pub ticks: u64,
    /// Transport threads that did not finish within the join timeout.
    pub abandoned_threads: usize,
    pub connect: RetryStats,
}

/// Builder for [`PluginRuntime`].
pub struct PluginRuntimeBuilder {
    config: RuntimeConfig,
    name: Option<String>,
    plugins: Vec<Arc<dyn Plugin>>,
    declared: HashMap<TypeId, Box<dyn Any>>,
    table: DispatchTable,
    error: Option<DeclarationError>,
}

impl PluginRuntimeBuilder {
    fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            name: None,
            plugins: Vec::new(),
            declared: HashMap::new(),
            table: DispatchTable::new(),
            error: None,
        }
    }

    /// Override the role announced during the handshake.
    ///
    /// Defaults to the plugin names joined with `+`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Host `plugin` in this runtime.
    pub fn plugin<P: Plugin>(mut self, plugin: P) -> Self {
        let plugin = Arc::new(plugin);

        let type_id = TypeId::of::<P>();
        if !self.declared.contains_key(&type_id) {
            match P::endpoints(EndpointsBuilder::new()).build() {
                Ok(endpoints) => {
                    self.declared.insert(type_id, Box::new(endpoints));
                }
                Err(e) => {
                    error!("Endpoint declaration failed: {}", e);
                    self.error.get_or_insert(e);
                    return self;
                }
            }
        }

        if let Some(endpoints) = self
            .declared
            .get(&type_id)
            .and_then(|declared| declared.downcast_ref::<Endpoints<P>>())
        {
            let report = self.table.bind(Arc::clone(&plugin), endpoints);
            debug!(
                "{}: bound {:?}, skipped {:?}",
                plugin.name(),
                report.bound,
                report.skipped
            );
        }

        self.plugins.push(plugin);
        self
    }

    /// Finish the runtime. Declaration errors surface here.
    pub fn build(self) -> Result<PluginRuntime> {
        if let Some(e) = self.error {
            return Err(e.into());
        }
        if self.plugins.is_empty() {
            return Err(MeshError::Config {
                message: "a runtime needs at least one plugin".to_string(),
            });
        }

        let name = self.name.unwrap_or_else(|| {
            self.plugins
                .iter()
                .map(|p| p.name().to_string())
                .collect::<Vec<_>>()
                .join("+")
        });

        Ok(PluginRuntime {
            config: self.config,
            name,
            uuid: Uuid::new_v4().to_string(),
            plugins: self.plugins,
            dispatch: Arc::new(self.table),
            shutdown: ShutdownSignal::new(),
            state: Mutex::new(RuntimeState::Idle),
        })
    }
}

/// Hosts one or more plugins on a single coordinator connection.
pub struct PluginRuntime {
    config: RuntimeConfig,
    name: String,
    uuid: String,
    plugins: Vec<Arc<dyn Plugin>>,
    dispatch: Arc<DispatchTable>,
    shutdown: ShutdownSignal,
    state: Mutex<RuntimeState>,
}

impl std::fmt::Debug for PluginRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRuntime")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .field("state", &self.state())
            .field("dispatch", &self.dispatch)
            .finish()
    }
}

impl PluginRuntime {
    pub fn builder(config: RuntimeConfig) -> PluginRuntimeBuilder {
        PluginRuntimeBuilder::new(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier sent as the sender uuid of every outgoing message.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.dispatch
    }

    /// Signal shared with the transport threads. Raising it stops [`PluginRuntime::run`].
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: RuntimeState) {
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != state {
            info!("{}: {} -> {}", self.name, *current, state);
            *current = state;
        }
    }

    /// Connect, handshake and tick until something stops the runtime.
    ///
    /// The state is `Stopped` on return, whether the run succeeded or not.
    pub fn run(&self) -> Result<RunReport> {
        self.set_state(RuntimeState::Connecting);
        let result = self.connect_and_serve();
        self.set_state(RuntimeState::Stopped);
        result
    }

    fn connect_and_serve(&self) -> Result<RunReport> {
        let (stream, connect) = connect_with_retry(self.config.addr, &self.config.retry)
            .inspect_err(|e| error!("{}", e))?;

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let origin = Route::role(self.name.clone()).with_uuid(self.uuid.clone());
        let (comm, queue) = CommChannel::new(self.shutdown.clone(), origin);
        let mut transport = Transport::spawn(
            stream,
            comm.clone(),
            queue,
            Arc::clone(&self.dispatch),
            rt.handle().clone(),
            TransportSettings::from(&self.config),
        )?;

        let outcome = rt.block_on(self.session(&comm, &transport));

        self.set_state(RuntimeState::ShuttingDown);
        let stop = Message::new(calls::STOP)
            .from_route(comm.origin().clone())
            .send_to(Route::role(TransportConfig::MANAGER_ROLE));
        let abandoned_threads = transport.shutdown(self.config.join_timeout, Some(&stop));
        if comm.pending_count() > 0 {
            debug!("{} request(s) still pending at shutdown", comm.pending_count());
        }
        drop(rt);

        let (reason, ticks) = outcome?;
        info!("{} stopped after {} tick(s): {:?}", self.name, ticks, reason);
        Ok(RunReport {
            reason,
            ticks,
            abandoned_threads,
            connect,
        })
    }

    async fn session(
        &self,
        comm: &CommChannel,
        transport: &TransportHandle,
    ) -> Result<(StopReason, u64)> {
        self.set_state(RuntimeState::Handshaking);
        self.handshake(comm).await?;

        self.set_state(RuntimeState::Running);
        let mut ticks = 0u64;
        loop {
            if self.shutdown.is_raised() {
                return Ok((stop_reason(transport), ticks));
            }

            let cycle = join_all(self.plugins.iter().map(|plugin| plugin.tick(comm)));
            let results = tokio::select! {
                biased;
                _ = self.shutdown.raised() => return Ok((stop_reason(transport), ticks)),
                results = cycle => results,
            };
            ticks += 1;

            if results.iter().any(|keep_going| !keep_going) {
                return Ok((StopReason::PluginFinished, ticks));
            }
            if !transport.reader_alive() {
                warn!("Reader thread is gone");
                return Ok((StopReason::ReaderExited, ticks));
            }
            if !transport.writer_alive() {
                warn!("Writer thread is gone");
                return Ok((StopReason::WriterExited, ticks));
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval) => {}
                _ = self.shutdown.raised() => {}
            }
        }
    }

    async fn handshake(&self, comm: &CommChannel) -> Result<()> {
        let handles: Vec<String> = self.dispatch.names().map(String::from).collect();
        let args = to_payload(&HandshakeArgs {
            handles: handles.clone(),
        })?;
        let msg = Message::with_args(calls::HANDSHAKE, args)
            .send_to(Route::role(TransportConfig::MANAGER_ROLE));

        let continuation = comm.send_and_register(msg)?;
        let reply = comm
            .await_reply_timeout(continuation, self.config.handshake_timeout)
            .await?;

        if let Some(message) = reply.error_message() {
            return Err(MeshError::Remote {
                call: calls::HANDSHAKE.to_string(),
                message: message.to_string(),
            });
        }

        let reply: HandshakeReply = from_payload(reply.response.unwrap_or_default())?;
        if let Some(registered) = reply.registered {
            let missing: Vec<String> = self
                .dispatch
                .required()
                .filter(|name| !registered.iter().any(|r| r == name))
                .map(String::from)
                .collect();
            if !missing.is_empty() {
                return Err(MeshError::RegistrationRejected { missing });
            }
            info!("Coordinator registered {:?}", registered);
        } else {
            info!("Handshake complete, offering {:?}", handles);
        }

        Ok(())
    }
}

fn stop_reason(transport: &TransportHandle) -> StopReason {
    if !transport.reader_alive() {
        StopReason::ReaderExited
    } else if !transport.writer_alive() {
        StopReason::WriterExited
    } else {
        StopReason::ShutdownSignalled
    }
}
