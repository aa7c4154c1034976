//! Error types for the mesh runtime.
//!
//! `MeshError` is the error returned by every fallible library operation.
//! Wire decoding and endpoint declaration have their own error enums so that
//! callers can tell them apart from plain I/O failures.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while decoding or encoding a wire frame.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Truncated frame: expected {expected} bytes, got {received}")]
    Truncated { expected: usize, received: usize },

    #[error("Frame of {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed message: {message}")]
    Malformed { message: String },

    #[error("Frame stalled: {pending} bytes pending for {stalled_for:?}")]
    Stalled {
        pending: usize,
        stalled_for: Duration,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CodecError::Malformed {
            message: message.into(),
        }
    }
}

/// Errors raised while declaring a plugin's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("Name clash on endpoint `{name}`: two endpoints in {plugin} share the exported name")]
    NameClash { plugin: String, name: String },

    #[error("Endpoint `{name}` in {plugin} uses a reserved control call name")]
    Reserved { plugin: String, name: String },

    #[error("`required()` called on {plugin} before any endpoint was declared")]
    NothingToRequire { plugin: String },
}

/// Main error type for the mesh runtime.
#[derive(Debug, Error)]
pub enum MeshError {
    // Transport errors
    #[error("Failed to connect to {addr} after {attempts} attempt(s): {message}")]
    Connect {
        addr: String,
        attempts: u32,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Connection to the coordinator is closed")]
    Disconnected,

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Correlation errors
    #[error("A reply is already being awaited for message {id}")]
    DuplicateCorrelation { id: String },

    #[error("No response received for message {id}")]
    NoResponse { id: String },

    #[error("Remote `{call}` failed: {message}")]
    Remote { call: String, message: String },

    // Registration errors
    #[error("Declaration error: {0}")]
    Declaration(#[from] DeclarationError),

    #[error("Coordinator did not register required endpoints: {missing:?}")]
    RegistrationRejected { missing: Vec<String> },

    #[error("invalid arguments for `{call}`: {message}")]
    InvalidArgs { call: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid address {addr}: {message}")]
    InvalidAddress { addr: String, message: String },
}

/// Result type alias for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;

impl From<std::io::Error> for MeshError {
    fn from(err: std::io::Error) -> Self {
        MeshError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(err: serde_json::Error) -> Self {
        MeshError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MeshError {
    /// Create a connect error for an exhausted retry loop.
    pub fn connect(addr: SocketAddr, attempts: u32, err: std::io::Error) -> Self {
        MeshError::Connect {
            addr: addr.to_string(),
            attempts,
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Whether this error must terminate the process rather than a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::Connect { .. }
                | MeshError::Declaration(_)
                | MeshError::RegistrationRejected { .. }
                | MeshError::Config { .. }
                | MeshError::InvalidAddress { .. }
        )
    }

    /// Check if this error should trigger a retry.
    ///
    /// I/O errors count only when the peer may simply not be up yet.
    pub fn is_retryable(&self) -> bool {
        match self {
            MeshError::Io {
                source: Some(err), ..
            } => matches!(
                err.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::AddrNotAvailable
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::Interrupted
            ),
            MeshError::Io { source: None, .. } | MeshError::Disconnected => true,
            _ => false,
        }
    }
}
