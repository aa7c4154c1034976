//! The message exchanged between plugins and the coordinator.
//!
//! A [`Message`] is either a request/notification (no response) or a reply
//! (non-empty response). Replies keep the id of the request they answer, which
//! is how the correlation registry matches them to a waiting caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured key/value payload used for `args` and `resp`.
pub type Payload = Map<String, Value>;

/// Call names with meaning to the runtime itself.
pub mod calls {
    pub const HANDSHAKE: &str = "handshake";
    pub const STOP: &str = "stop";
    pub const QUIT: &str = "quit";
    pub const ERROR: &str = "error";
    pub const ACK: &str = "ack";

    /// Names plugins may not export as endpoints.
    pub const RESERVED: [&str; 5] = [HANDSHAKE, STOP, QUIT, ERROR, ACK];
}

/// The closed set of control calls understood by every runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCall {
    Handshake,
    /// `stop` or `quit`
    Stop,
    Error,
    Ack,
}

/// Tagged view of a message's call name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call<'a> {
    Control(ControlCall),
    Endpoint(&'a str),
}

impl<'a> Call<'a> {
    pub fn parse(call: &'a str) -> Self {
        match call {
            calls::HANDSHAKE => Call::Control(ControlCall::Handshake),
            calls::STOP | calls::QUIT => Call::Control(ControlCall::Stop),
            calls::ERROR => Call::Control(ControlCall::Error),
            calls::ACK => Call::Control(ControlCall::Ack),
            name => Call::Endpoint(name),
        }
    }
}

/// Routing descriptor for `sender` and `dest`.
///
/// The coordinator decides how to interpret it. `broadcast` is a hint only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub broadcast: bool,
}

impl Route {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Whether the route names at least one role, identifier or address.
    pub fn is_addressable(&self) -> bool {
        self.role.is_some() || self.uuid.is_some() || self.addr.is_some()
    }
}

/// A single request, notification or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "msg_id")]
    id: String,
    pub call: String,
    pub args: Payload,
    #[serde(rename = "resp", default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_uuid: Option<String>,
}

impl Message {
    /// Create a request with empty arguments and a fresh id.
    pub fn new(call: impl Into<String>) -> Self {
        Self::with_args(call, Payload::new())
    }

    /// Create a request with the given arguments and a fresh id.
    pub fn with_args(call: impl Into<String>, args: Payload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call: call.into(),
            args,
            response: None,
            sender: None,
            dest: None,
            parent_id: None,
            ack_uuid: None,
        }
    }

    /// Replace the generated id. Only valid before the message is sent.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn from_route(mut self, sender: Route) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn send_to(mut self, dest: Route) -> Self {
        self.dest = Some(dest);
        self
    }

    /// Mark this message as derived from another request.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_ack(mut self, ack_uuid: impl Into<String>) -> Self {
        self.ack_uuid = Some(ack_uuid.into());
        self
    }

    pub fn with_response(mut self, response: Payload) -> Self {
        self.response = Some(response);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parsed_call(&self) -> Call<'_> {
        Call::parse(&self.call)
    }

    /// A message with a non-empty response is a reply.
    pub fn is_reply(&self) -> bool {
        self.response.as_ref().is_some_and(|resp| !resp.is_empty())
    }

    pub fn is_error(&self) -> bool {
        self.call == calls::ERROR
    }

    /// `stop` and `quit` terminate the local runtime whoever sent them.
    pub fn is_quit(&self) -> bool {
        matches!(self.parsed_call(), Call::Control(ControlCall::Stop))
    }

    /// Address the message back to whoever sent it.
    pub fn return_to_sender(&mut self) {
        self.dest = self.sender.clone();
    }

    /// Turn this request into its reply.
    pub fn reply(mut self, response: Payload) -> Self {
        self.response = Some(response);
        self.return_to_sender();
        self
    }

    /// Turn this request into an `error` reply for its sender.
    pub fn into_error(mut self, message: impl Into<String>) -> Self {
        let mut response = Payload::new();
        response.insert("error".to_string(), Value::String(message.into()));
        self.call = calls::ERROR.to_string();
        self.reply(response)
    }

    /// The error text carried by an `error` reply, if any.
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }
        self.response
            .as_ref()
            .and_then(|resp| resp.get("error"))
            .and_then(Value::as_str)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(id={})", self.call, self.id)
    }
}
