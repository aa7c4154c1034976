//! Call names and typed payloads exchanged with the coordinator and the
//! external collaborators.
//!
//! Only the shapes live here. What the NLU, search and audio collaborators do
//! with these requests is their business.

use crate::message::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REGISTER_APP: &str = "register_app";
pub const DISPATCH: &str = "dispatch";
pub const SEARCH: &str = "search";
pub const PLAY: &str = "play";
pub const SPEAK: &str = "speak";

/// Arguments of the mandatory `handshake` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeArgs {
    pub handles: Vec<String>,
}

/// Reply to `handshake` (and to `register_app`).
///
/// `registered` is absent when the coordinator accepts every handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered: Option<Vec<String>>,
}

/// `register_app` uses the same shapes as the handshake.
pub type RegisterAppArgs = HandshakeArgs;
pub type RegisterAppReply = HandshakeReply;

/// `dispatch`: free text for the NLU collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchArgs {
    pub text: String,
}

/// `search`: lookup terms for the search collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchArgs {
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchReply {
    #[serde(default)]
    pub results: Vec<Value>,
}

/// `play`: audio playback request. No reply is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayArgs {
    pub track: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<String>,
}

/// `speak`: text-to-speech request. No reply is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakArgs {
    pub text: String,
}

/// Response payload of an `error` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// Convert a serializable value into a message payload.
///
/// Objects are used as-is, `null` (and unit) become an empty payload, and any
/// other JSON value is wrapped as `{"value": ...}`.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Payload> {
    Ok(match serde_json::to_value(value)? {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    })
}

/// Convert a message payload into a typed value.
pub fn from_payload<T: for<'de> Deserialize<'de>>(payload: Payload) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(payload))
}
