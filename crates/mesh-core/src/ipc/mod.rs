//! Connection to the coordinator.
//!
//! # Architecture
//!
//! - **Codec**: length-prefixed JSON framing of [`Message`](crate::message::Message)
//! - **Transport**: reader and writer threads over one TCP stream
//! - **Comm**: outbound queue plus the correlation registry for replies
//! - **Protocol**: call names and typed payloads shared with the coordinator

pub mod codec;
pub mod comm;
pub mod protocol;
pub mod transport;

pub use comm::{CommChannel, Continuation, OutboundQueue};
pub use transport::{Transport, TransportHandle, TransportSettings};
