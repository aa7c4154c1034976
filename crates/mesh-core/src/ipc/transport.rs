//! Reader and writer threads over one TCP connection.
//!
//! ```text
//!             +--------------------+
//!  socket --> | reader thread      | --resolve--> CommChannel continuations
//!             |  FrameDecoder      | --spawn----> handler tasks (runtime thread)
//!             +--------------------+
//!             +--------------------+
//!  socket <-- | writer thread      | <--pop------ OutboundQueue (FIFO)
//!             +--------------------+
//! ```
//!
//! Both threads block only on a read or pop bounded by `poll_interval` and
//! check the shared [`ShutdownSignal`] at that boundary. Whichever thread hits
//! a fatal condition raises the signal so the other side and the runtime loop
//! wind down too.

use crate::config::{RuntimeConfig, TransportConfig};
use crate::dispatch::DispatchTable;
use crate::error::{CodecError, Result};
use crate::ipc::codec::{self, FrameDecoder};
use crate::ipc::comm::{CommChannel, OutboundQueue, Pop};
use crate::message::{Call, ControlCall, Message};
use crate::shutdown::ShutdownSignal;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Timing knobs the transport threads need.
#[derive(Debug, Clone, Copy)]
pub struct TransportSettings {
    pub poll_interval: Duration,
    pub frame_stall_timeout: Duration,
}

impl From<&RuntimeConfig> for TransportSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            frame_stall_timeout: config.frame_stall_timeout,
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            poll_interval: TransportConfig::POLL_INTERVAL,
            frame_stall_timeout: TransportConfig::FRAME_STALL_TIMEOUT,
        }
    }
}

/// Entry point for starting the transport threads.
pub struct Transport;

impl Transport {
    /// Start the reader and writer threads on clones of `stream`.
    ///
    /// Handler tasks for inbound requests are spawned on `runtime`.
    pub fn spawn(
        stream: TcpStream,
        comm: CommChannel,
        queue: OutboundQueue,
        dispatch: Arc<DispatchTable>,
        runtime: Handle,
        settings: TransportSettings,
    ) -> Result<TransportHandle> {
        let shutdown = comm.shutdown_signal().clone();
        stream.set_read_timeout(Some(settings.poll_interval))?;
        stream.set_nodelay(true)?;

        let reader = Reader {
            stream: stream.try_clone()?,
            comm,
            dispatch,
            runtime,
            shutdown: shutdown.clone(),
            settings,
        };
        let writer = Writer {
            stream: stream.try_clone()?,
            queue,
            shutdown: shutdown.clone(),
            poll_interval: settings.poll_interval,
        };

        let writer = std::thread::Builder::new()
            .name("mesh-writer".into())
            .spawn(move || writer.run())?;
        let reader = std::thread::Builder::new()
            .name("mesh-reader".into())
            .spawn(move || reader.run())?;

        Ok(TransportHandle {
            stream,
            reader: Some(reader),
            writer: Some(writer),
            shutdown,
        })
    }
}

/// Handle to the running reader and writer threads.
#[derive(Debug)]
pub struct TransportHandle {
    stream: TcpStream,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    shutdown: ShutdownSignal,
}

impl TransportHandle {
    pub fn reader_alive(&self) -> bool {
        self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn writer_alive(&self) -> bool {
        self.writer.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Raise the signal, join the writer, close the socket and join the reader.
    ///
    /// `farewell` is written directly on the socket once the writer is gone,
    /// so it goes out even if the writer already drained its queue and quit.
    /// Each join waits at most `join_timeout`. Returns the number of threads
    /// that had to be abandoned.
    pub fn shutdown(&mut self, join_timeout: Duration, farewell: Option<&Message>) -> usize {
        self.shutdown.raise();
        let mut abandoned = 0;

        if join_bounded(self.writer.take(), "writer", join_timeout) {
            if let Some(msg) = farewell {
                if let Err(e) = write_frame(&mut &self.stream, msg) {
                    debug!("Could not send {}: {}", msg, e);
                }
            }
        } else {
            abandoned += 1;
        }

        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }

        if !join_bounded(self.reader.take(), "reader", join_timeout) {
            abandoned += 1;
        }

        abandoned
    }
}

fn write_frame<W: Write>(out: &mut W, msg: &Message) -> std::result::Result<(), CodecError> {
    let frame = codec::encode(msg)?;
    out.write_all(&frame)?;
    out.flush()?;
    debug!("Sent {}", msg);
    Ok(())
}

/// Wait for a thread to finish, giving up after `timeout`.
fn join_bounded(handle: Option<JoinHandle<()>>, name: &str, timeout: Duration) -> bool {
    let Some(handle) = handle else {
        return true;
    };

    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("Abandoning {} thread after {:?}", name, timeout);
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if handle.join().is_err() {
        error!("{} thread panicked", name);
    }
    true
}

struct Reader {
    stream: TcpStream,
    comm: CommChannel,
    dispatch: Arc<DispatchTable>,
    runtime: Handle,
    shutdown: ShutdownSignal,
    settings: TransportSettings,
}

/// Whether the reader keeps going after routing a message.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

impl Reader {
    fn run(mut self) {
        match self.read_loop() {
            Ok(()) => debug!("Reader exiting"),
            Err(e) => error!("Reader failed: {}", e),
        }
        self.shutdown.raise();
    }

    fn read_loop(&mut self) -> std::result::Result<(), CodecError> {
        let mut decoder = FrameDecoder::new();
        let mut chunk = vec![0u8; TransportConfig::READ_CHUNK_SIZE];
        let mut last_progress = Instant::now();

        loop {
            if self.shutdown.is_raised() {
                return Ok(());
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    if self.shutdown.is_raised() {
                        return Ok(());
                    }
                    decoder.finish()?;
                    info!("Coordinator closed the connection");
                    return Ok(());
                }
                Ok(n) => {
                    decoder.extend(&chunk[..n]);
                    last_progress = Instant::now();
                    while let Some(msg) = decoder.next_message()? {
                        if self.route(msg) == Flow::Stop {
                            return Ok(());
                        }
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    let stalled_for = last_progress.elapsed();
                    if decoder.pending() > 0 && stalled_for >= self.settings.frame_stall_timeout {
                        return Err(CodecError::Stalled {
                            pending: decoder.pending(),
                            stalled_for,
                        });
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    if self.shutdown.is_raised() {
                        return Ok(());
                    }
                    return Err(CodecError::Io(e));
                }
            }
        }
    }

    fn route(&self, msg: Message) -> Flow {
        debug!("Received {}", msg);

        if msg.is_quit() {
            info!("Received {}; shutting down", msg.call);
            self.shutdown.raise();
            return Flow::Stop;
        }

        let Some(msg) = self.comm.resolve(msg) else {
            return Flow::Continue;
        };

        // Replies never reach a handler, even when their call names one.
        match msg.parsed_call() {
            Call::Control(ControlCall::Error) => {
                error!(
                    "Coordinator reported an error for {}: {}",
                    msg,
                    msg.error_message().unwrap_or("<no message>")
                );
                return Flow::Continue;
            }
            Call::Control(ControlCall::Ack) => {
                debug!("Acknowledged: {}", msg);
                return Flow::Continue;
            }
            _ if msg.is_reply() => {
                warn!("Discarding unexpected reply {}", msg);
                return Flow::Continue;
            }
            _ => {}
        }

        match self.dispatch.invoke(msg, &self.comm) {
            Ok(task) => {
                self.runtime.spawn(task);
            }
            Err(msg) => warn!("No endpoint for {}; dropping", msg),
        }
        Flow::Continue
    }
}

struct Writer {
    stream: TcpStream,
    queue: OutboundQueue,
    shutdown: ShutdownSignal,
    poll_interval: Duration,
}

impl Writer {
    fn run(mut self) {
        loop {
            let msg = match self.queue.pop(self.poll_interval) {
                Pop::Message(msg) => msg,
                Pop::Empty => {
                    if self.shutdown.is_raised() {
                        break;
                    }
                    continue;
                }
                Pop::Closed => break,
            };

            if let Err(e) = write_frame(&mut self.stream, &msg) {
                error!("Failed to send {}: {}", msg, e);
                break;
            }

            if msg.is_quit() {
                debug!("Sent {}; writer done", msg.call);
                break;
            }
        }

        debug!("Writer exiting");
        self.shutdown.raise();
    }
}
