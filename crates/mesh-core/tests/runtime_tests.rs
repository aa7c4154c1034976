//! End-to-end tests of `PluginRuntime` against a scripted coordinator.

mod common;

use common::{payload, MockCoordinator};
use mesh_core::ipc::protocol::{
    from_payload, to_payload, RegisterAppArgs, RegisterAppReply, REGISTER_APP,
};
use mesh_core::{
    async_trait, endpoint, CommChannel, Context, EndpointsBuilder, MeshError, Message, Payload,
    Plugin, PluginRuntime, Route, RuntimeState, StopReason,
};
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct Story {
    text: String,
}

/// Serves `tell_story`; on its first tick registers the app and stops.
struct Storyteller {
    registered: Arc<Mutex<Option<Message>>>,
}

impl Storyteller {
    async fn tell_story(&self, _req: Payload, _ctx: &Context) -> anyhow::Result<Story> {
        Ok(Story {
            text: "Once upon a time".into(),
        })
    }
}

#[async_trait]
impl Plugin for Storyteller {
    fn name(&self) -> &str {
        "storyteller"
    }

    fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
        endpoint!(b, Storyteller::tell_story).required()
    }

    async fn tick(&self, comm: &CommChannel) -> bool {
        let args = RegisterAppArgs {
            handles: vec!["tell_story".into()],
        };
        let msg = Message::with_args(REGISTER_APP, to_payload(&args).unwrap()).with_id("foo");

        let reply = match comm.request(msg).await {
            Ok(reply) => reply,
            Err(_) => return false,
        };
        *self.registered.lock().unwrap() = Some(reply);
        false
    }
}

/// Fails or answers on request; counts its ticks.
struct Fragile {
    ticks: Arc<AtomicU64>,
}

#[async_trait]
impl Plugin for Fragile {
    fn name(&self) -> &str {
        "fragile"
    }

    fn endpoints(b: EndpointsBuilder<Self>) -> EndpointsBuilder<Self> {
        b.raw("explode", |_, _, _| async { Err(anyhow::anyhow!("the cookie crumbled")) })
            .raw("ping", |_, _, _| async {
                Ok(Some(payload(json!({"pong": true}))))
            })
    }

    async fn tick(&self, _comm: &CommChannel) -> bool {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        true
    }
}

fn spawn_runtime(
    runtime: PluginRuntime,
) -> std::thread::JoinHandle<(mesh_core::Result<mesh_core::RunReport>, RuntimeState)> {
    std::thread::spawn(move || {
        let result = runtime.run();
        (result, runtime.state())
    })
}

#[test]
fn test_register_app_round_trip() {
    let coordinator = MockCoordinator::bind();
    let registered = Arc::new(Mutex::new(None));
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Storyteller {
            registered: Arc::clone(&registered),
        })
        .build()
        .unwrap();
    let uuid = runtime.uuid().to_string();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    let handshake = peer.complete_handshake(Some(&["tell_story"]));
    assert_eq!(handshake.args["handles"], json!(["tell_story"]));
    assert_eq!(
        handshake.sender,
        Some(Route::role("storyteller").with_uuid(uuid))
    );
    assert_eq!(handshake.dest, Some(Route::role("manager")));

    let request = peer.recv();
    assert_eq!(request.call, "register_app");
    assert_eq!(request.id(), "foo");
    assert_eq!(request.args["handles"], json!(["tell_story"]));
    let reply = Message::with_args("register_app", Payload::new())
        .with_id("foo")
        .with_response(payload(json!({"registered": ["tell_story"]})));
    peer.send(&reply);

    let stop = peer.recv_call("stop");
    assert_eq!(stop.dest, Some(Route::role("manager")));

    let (result, state) = handle.join().unwrap();
    let report = result.unwrap();
    assert_eq!(report.reason, StopReason::PluginFinished);
    assert_eq!(report.ticks, 1);
    assert_eq!(report.abandoned_threads, 0);
    assert_eq!(state, RuntimeState::Stopped);

    let answer = registered.lock().unwrap().take().expect("reply recorded");
    assert_eq!(answer.id(), "foo");
    let parsed: RegisterAppReply =
        from_payload(answer.response.unwrap()).unwrap();
    assert_eq!(parsed.registered, Some(vec!["tell_story".to_string()]));
}

#[test]
fn test_inbound_request_is_answered_to_sender() {
    let coordinator = MockCoordinator::bind();
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Storyteller {
            registered: Arc::new(Mutex::new(None)),
        })
        .build()
        .unwrap();
    let signal = runtime.shutdown_signal();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    peer.complete_handshake(None);
    // The storyteller's tick is waiting on `foo`; serve a request meanwhile.
    let register = peer.recv();
    assert_eq!(register.id(), "foo");

    let request = Message::new("tell_story")
        .with_id("story-1")
        .from_route(Route::role("cli").with_uuid("c-9"));
    peer.send(&request);

    let reply = peer.recv();
    assert_eq!(reply.id(), "story-1");
    assert_eq!(reply.dest, Some(Route::role("cli").with_uuid("c-9")));
    assert_eq!(reply.response.unwrap()["text"], json!("Once upon a time"));

    signal.raise();
    let (result, _) = handle.join().unwrap();
    assert_eq!(result.unwrap().reason, StopReason::ShutdownSignalled);
}

#[test]
fn test_handler_error_is_contained() {
    let coordinator = MockCoordinator::bind();
    let ticks = Arc::new(AtomicU64::new(0));
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Fragile {
            ticks: Arc::clone(&ticks),
        })
        .build()
        .unwrap();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    peer.complete_handshake(None);

    let sender = Route::role("cli").with_uuid("c-1");
    peer.send(&Message::new("explode").with_id("e-1").from_route(sender.clone()));

    let error = peer.recv();
    assert_eq!(error.id(), "e-1");
    assert!(error.is_error());
    assert_eq!(error.error_message(), Some("the cookie crumbled"));
    assert_eq!(error.dest, Some(sender.clone()));

    let ticks_at_error = ticks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(150));
    assert!(ticks.load(Ordering::SeqCst) > ticks_at_error);

    // Exactly one reply for the failed request: the next frame answers `ping`.
    peer.send(&Message::new("ping").with_id("p-1").from_route(sender));
    let pong = peer.recv();
    assert_eq!(pong.id(), "p-1");
    assert_eq!(pong.response.unwrap()["pong"], json!(true));

    peer.send(&Message::new("quit"));
    let (result, state) = handle.join().unwrap();
    let report = result.unwrap();
    assert!(matches!(
        report.reason,
        StopReason::ReaderExited | StopReason::ShutdownSignalled
    ));
    assert!(report.ticks >= 2);
    assert_eq!(state, RuntimeState::Stopped);
}

#[test]
fn test_missing_required_endpoint_rejects_registration() {
    let coordinator = MockCoordinator::bind();
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Storyteller {
            registered: Arc::new(Mutex::new(None)),
        })
        .build()
        .unwrap();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    peer.complete_handshake(Some(&[]));

    let (result, state) = handle.join().unwrap();
    match result {
        Err(MeshError::RegistrationRejected { missing }) => {
            assert_eq!(missing, vec!["tell_story".to_string()]);
        }
        other => panic!("expected registration rejection, got {other:?}"),
    }
    assert_eq!(state, RuntimeState::Stopped);
}

#[test]
fn test_handshake_error_reply_is_fatal() {
    let coordinator = MockCoordinator::bind();
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Fragile {
            ticks: Arc::new(AtomicU64::new(0)),
        })
        .build()
        .unwrap();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    let handshake = peer.recv();
    peer.send(&handshake.into_error("unknown role"));

    let (result, _) = handle.join().unwrap();
    assert!(matches!(
        result,
        Err(MeshError::Remote { ref message, .. }) if message == "unknown role"
    ));
}

#[test]
fn test_coordinator_disconnect_stops_runtime_promptly() {
    let coordinator = MockCoordinator::bind();
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Fragile {
            ticks: Arc::new(AtomicU64::new(0)),
        })
        .build()
        .unwrap();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    peer.complete_handshake(None);
    std::thread::sleep(Duration::from_millis(50));

    let closed_at = Instant::now();
    peer.close();

    let (result, _) = handle.join().unwrap();
    let report = result.unwrap();
    assert!(closed_at.elapsed() < Duration::from_secs(2));
    assert_ne!(report.reason, StopReason::PluginFinished);
    assert_eq!(report.abandoned_threads, 0);
}

#[test]
fn test_shutdown_signal_sends_stop() {
    let coordinator = MockCoordinator::bind();
    let runtime = PluginRuntime::builder(coordinator.config())
        .plugin(Fragile {
            ticks: Arc::new(AtomicU64::new(0)),
        })
        .build()
        .unwrap();
    let signal = runtime.shutdown_signal();
    let handle = spawn_runtime(runtime);

    let mut peer = coordinator.accept();
    peer.complete_handshake(None);

    signal.raise();

    let stop = peer.recv_call("stop");
    assert_eq!(stop.dest, Some(Route::role("manager")));
    let (result, _) = handle.join().unwrap();
    assert_eq!(result.unwrap().reason, StopReason::ShutdownSignalled);
}

#[test]
fn test_unreachable_coordinator_exhausts_retries() {
    let coordinator = MockCoordinator::bind();
    let config = coordinator.config();
    drop(coordinator);

    let runtime = PluginRuntime::builder(config)
        .plugin(Fragile {
            ticks: Arc::new(AtomicU64::new(0)),
        })
        .build()
        .unwrap();

    let err = runtime.run().unwrap_err();
    assert!(matches!(err, MeshError::Connect { attempts: 3, .. }));
    assert!(err.is_fatal());
}
