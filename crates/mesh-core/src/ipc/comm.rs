//! Correlation registry and outbound queue.
//!
//! `CommChannel` is how plugins and handlers talk to the coordinator. Sending
//! only enqueues onto the writer thread's FIFO; a caller that wants a reply
//! registers a continuation keyed by the message id and awaits it. The reader
//! thread resolves continuations as replies come off the wire.
//!
//! # Thread Safety
//!
//! The pending map is behind a `std::sync::Mutex` because it is touched from
//! the reader thread and from tasks on the runtime thread. The lock is never
//! held across an `.await`.

use crate::error::{MeshError, Result};
use crate::ipc::protocol::{from_payload, to_payload};
use crate::message::{Message, Route};
use crate::shutdown::ShutdownSignal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A waitable placeholder for the reply to one message.
#[derive(Debug)]
pub struct Continuation {
    id: String,
    rx: oneshot::Receiver<Message>,
}

impl Continuation {
    pub fn id(&self) -> &str {
        &self.id
    }
}

struct Inner {
    outbound: Sender<Message>,
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    shutdown: ShutdownSignal,
    origin: Route,
}

/// Cloneable handle to the outbound queue and the correlation registry.
#[derive(Clone)]
pub struct CommChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CommChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommChannel")
            .field("origin", &self.inner.origin)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl CommChannel {
    /// Create a channel and the queue the writer thread drains.
    ///
    /// `origin` is stamped as the sender of outgoing messages that have none.
    pub fn new(shutdown: ShutdownSignal, origin: Route) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::channel();
        let channel = Self {
            inner: Arc::new(Inner {
                outbound: tx,
                pending: Mutex::new(HashMap::new()),
                shutdown,
                origin,
            }),
        };
        (channel, OutboundQueue { rx })
    }

    /// The route this runtime sends from.
    pub fn origin(&self) -> &Route {
        &self.inner.origin
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.inner.shutdown
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Message>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a message for the writer without registering for a reply.
    pub fn send(&self, mut msg: Message) -> Result<()> {
        if msg.sender.is_none() && self.inner.origin.is_addressable() {
            msg.sender = Some(self.inner.origin.clone());
        }
        debug!("Queueing {}", msg);
        self.inner
            .outbound
            .send(msg)
            .map_err(|_| MeshError::Disconnected)
    }

    /// Register a continuation for `msg.id`, then enqueue the message.
    ///
    /// Refused with [`MeshError::Disconnected`] once shutdown is raised.
    pub fn send_and_register(&self, msg: Message) -> Result<Continuation> {
        self.inner.shutdown.check()?;
        let id = msg.id().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending();
            if pending.contains_key(&id) {
                return Err(MeshError::DuplicateCorrelation { id });
            }
            pending.insert(id.clone(), tx);
        }

        if let Err(e) = self.send(msg) {
            self.drop(&id);
            return Err(e);
        }

        Ok(Continuation { id, rx })
    }

    /// Suspend the calling task until the reply arrives.
    ///
    /// Returns [`MeshError::NoResponse`] as soon as the shutdown signal is
    /// raised or the entry is dropped. The entry is removed either way.
    pub async fn await_reply(&self, continuation: Continuation) -> Result<Message> {
        let Continuation { id, rx } = continuation;

        let reply = tokio::select! {
            biased;
            reply = rx => reply.ok(),
            _ = self.inner.shutdown.raised() => None,
        };

        self.drop(&id);
        reply.ok_or(MeshError::NoResponse { id })
    }

    /// Like [`CommChannel::await_reply`], giving up after `timeout`.
    pub async fn await_reply_timeout(
        &self,
        continuation: Continuation,
        timeout: Duration,
    ) -> Result<Message> {
        let id = continuation.id.clone();
        match tokio::time::timeout(timeout, self.await_reply(continuation)).await {
            Ok(result) => result,
            Err(_) => {
                self.drop(&id);
                debug!("Gave up waiting for reply to {} after {:?}", id, timeout);
                Err(MeshError::NoResponse { id })
            }
        }
    }

    /// Send a message and wait for its reply.
    pub async fn request(&self, msg: Message) -> Result<Message> {
        let continuation = self.send_and_register(msg)?;
        self.await_reply(continuation).await
    }

    /// Typed request: serialize `args`, await the reply and decode its response.
    ///
    /// An `error` reply is returned as [`MeshError::Remote`].
    pub async fn call<Req, Resp>(&self, call: &str, args: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.call_with(Message::with_args(call, to_payload(args)?))
            .await
    }

    /// Typed request for a message the caller has already built.
    pub async fn call_with<Resp: DeserializeOwned>(&self, msg: Message) -> Result<Resp> {
        let call = msg.call.clone();
        let reply = self.request(msg).await?;

        if let Some(message) = reply.error_message() {
            return Err(MeshError::Remote {
                call,
                message: message.to_string(),
            });
        }

        Ok(from_payload(reply.response.unwrap_or_default())?)
    }

    /// Forget a pending entry. A reply arriving later is discarded.
    pub fn drop(&self, id: &str) -> bool {
        self.pending().remove(id).is_some()
    }

    /// Hand a decoded message to whoever is waiting on its id.
    ///
    /// Gives the message back when nobody is waiting, so the caller can route
    /// it elsewhere.
    pub fn resolve(&self, msg: Message) -> Option<Message> {
        let waiter = self.pending().remove(msg.id());
        match waiter {
            Some(tx) => {
                let id = msg.id().to_string();
                if tx.send(msg).is_err() {
                    debug!("Awaiter for {} went away before its reply arrived", id);
                }
                None
            }
            None => Some(msg),
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending().len()
    }
}

/// Result of one bounded pop from the outbound queue.
#[derive(Debug)]
pub enum Pop {
    Message(Message),
    Empty,
    Closed,
}

/// Receiving end of the outbound FIFO, owned by the writer thread.
#[derive(Debug)]
pub struct OutboundQueue {
    rx: Receiver<Message>,
}

impl OutboundQueue {
    /// Wait up to `timeout` for the next outbound message.
    pub fn pop(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Pop::Message(msg),
            Err(RecvTimeoutError::Timeout) => Pop::Empty,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Outbound queue closed");
                Pop::Closed
            }
        }
    }
}
