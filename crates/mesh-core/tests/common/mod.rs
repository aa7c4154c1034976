//! Scripted coordinator for runtime integration tests.

#![allow(dead_code)]

use mesh_core::ipc::codec;
use mesh_core::{Message, Payload, RetryPolicy, RuntimeConfig};
use serde_json::{json, Value};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// A coordinator stand-in listening on a loopback port.
pub struct MockCoordinator {
    listener: TcpListener,
}

impl MockCoordinator {
    pub fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock coordinator");
        Self { listener }
    }

    pub fn addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("local addr")
    }

    /// Runtime config pointing at this coordinator with short timings.
    pub fn config(&self) -> RuntimeConfig {
        RuntimeConfig::new(self.addr())
            .with_retry(
                RetryPolicy::new()
                    .with_max_retries(3)
                    .with_retry_delay(Duration::from_millis(10)),
            )
            .with_poll_interval(Duration::from_millis(20))
            .with_tick_interval(Duration::from_millis(20))
            .with_handshake_timeout(Duration::from_secs(2))
            .with_join_timeout(Duration::from_secs(1))
    }

    pub fn accept(&self) -> Peer {
        let (stream, _) = self.listener.accept().expect("accept plugin");
        stream
            .set_read_timeout(Some(IO_TIMEOUT))
            .expect("set read timeout");
        Peer { stream }
    }
}

/// The coordinator's side of one plugin connection.
pub struct Peer {
    stream: TcpStream,
}

impl Peer {
    pub fn recv(&mut self) -> Message {
        codec::decode(&mut self.stream)
            .expect("decode frame")
            .expect("plugin closed the connection")
    }

    /// Receive messages until one with `call` arrives.
    pub fn recv_call(&mut self, call: &str) -> Message {
        loop {
            let msg = self.recv();
            if msg.call == call {
                return msg;
            }
        }
    }

    pub fn send(&mut self, msg: &Message) {
        let frame = codec::encode(msg).expect("encode frame");
        self.stream.write_all(&frame).expect("write frame");
    }

    /// Answer the handshake, optionally confirming a subset of the handles.
    pub fn complete_handshake(&mut self, registered: Option<&[&str]>) -> Message {
        let handshake = self.recv();
        assert_eq!(handshake.call, "handshake");

        let resp = match registered {
            Some(names) => payload(json!({ "registered": names })),
            None => payload(json!({ "ok": true })),
        };
        self.send(&handshake.clone().reply(resp));
        handshake
    }

    pub fn close(self) {
        drop(self.stream);
    }
}

pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
