//! Shared helpers for plugin unit tests.

use mesh_core::ipc::comm::{OutboundQueue, Pop};
use mesh_core::{
    CommChannel, DispatchTable, EndpointsBuilder, Message, Plugin, Route, ShutdownSignal,
};
use std::sync::Arc;
use std::time::Duration;

/// A dispatch table holding only `plugin`'s endpoints.
pub(crate) fn table_for<P: Plugin>(plugin: P) -> DispatchTable {
    let endpoints = P::endpoints(EndpointsBuilder::new()).build().unwrap();
    let mut table = DispatchTable::new();
    table.bind(Arc::new(plugin), &endpoints);
    table
}

pub(crate) fn comm(role: &str) -> (CommChannel, OutboundQueue) {
    CommChannel::new(ShutdownSignal::new(), Route::role(role).with_uuid("test-uuid"))
}

/// Next queued outbound message, failing the test after one second.
pub(crate) fn next_outbound(queue: &OutboundQueue) -> Message {
    match queue.pop(Duration::from_secs(1)) {
        Pop::Message(msg) => msg,
        other => panic!("expected an outbound message, got {other:?}"),
    }
}
