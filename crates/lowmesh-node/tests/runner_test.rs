//! Interface tasks under paused tokio time.
//!
//! With `start_paused` the runtime auto-advances the clock whenever every
//! task is waiting on a timer, so handshakes, CoAP retransmissions and
//! maintenance ticks run without wall-clock delays.

use std::time::Duration;

use tokio::sync::mpsc;

use lowmesh_core::{LinkAddr, MacFrame, PanId};
use lowmesh_node::security_ops::FRAME_COUNTER_MARGIN;
use lowmesh_node::{
    EchoHandler, FailureReason, InterfaceHandle, InterfaceTask, LoopbackRadio, MemoryRadio, MeshStack, NullRadio,
    RunnerOptions, RxFrame, StackConfig, StackEvent, Storage, spawn_interface,
};
use lowmesh_protocol::coap::{Code, CoapMessage};
use lowmesh_transport::neighbor::TrustState;
use lowmesh_transport::rpl::DodagRole;

const ROOT: LinkAddr = LinkAddr::new([0x01; 8]);
const NODE: LinkAddr = LinkAddr::new([0x02; 8]);

fn config(addr: LinkAddr, role: DodagRole) -> StackConfig {
    let mut config = StackConfig::new(addr, PanId(0x00AB), role, [0x42; 32]);
    config.seed = Some(u64::from(addr.to_bytes()[0]));
    config
}

struct Interface {
    handle: InterfaceHandle,
    task: InterfaceTask<LoopbackRadio>,
}

/// Move every frame put on the air by one interface to another's receiver.
fn relay(mut air: mpsc::Receiver<RxFrame>, to: mpsc::Sender<RxFrame>) {
    tokio::spawn(async move {
        while let Some(frame) = air.recv().await {
            if to.send(frame).await.is_err() {
                break;
            }
        }
    });
}

/// A border router and a router whose loopback radios feed each other.
fn spawn_pair() -> (Interface, Interface) {
    let (root_out, root_air) = mpsc::channel(64);
    let (node_out, node_air) = mpsc::channel(64);

    let root = MeshStack::new(config(ROOT, DodagRole::BorderRouter), LoopbackRadio::new(root_out))
        .unwrap()
        .with_handler(EchoHandler);
    let node = MeshStack::new(config(NODE, DodagRole::Router), LoopbackRadio::new(node_out)).unwrap();

    let (root_handle, root_task) = spawn_interface(root, RunnerOptions::default());
    let (node_handle, node_task) = spawn_interface(node, RunnerOptions::default());
    relay(root_air, node_task.radio_tx.clone());
    relay(node_air, root_task.radio_tx.clone());

    (
        Interface {
            handle: root_handle,
            task: root_task,
        },
        Interface {
            handle: node_handle,
            task: node_task,
        },
    )
}

async fn wait_for(events: &mut mpsc::Receiver<StackEvent>, matches: impl Fn(&StackEvent) -> bool) -> StackEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if matches(&event) => return event,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("event not observed")
}

fn authenticated_with(peer: LinkAddr) -> impl Fn(&StackEvent) -> bool {
    move |event| {
        matches!(
            event,
            StackEvent::NeighborStateChanged { neighbor, to: TrustState::Authenticated, .. } if *neighbor == peer
        )
    }
}

fn status_request() -> CoapMessage {
    CoapMessage::request(Code::GET, "status", Vec::new())
}

#[tokio::test(start_paused = true)]
async fn test_request_round_trip_between_interfaces() {
    lowmesh_node::logging::init_for_tests();
    let (root, mut node) = spawn_pair();

    wait_for(&mut node.task.events, authenticated_with(ROOT)).await;

    let request = CoapMessage::request(Code::POST, "echo", b"hello mesh".to_vec());
    let response = node.handle.send_request(ROOT, request, true).await.unwrap();
    assert_eq!(response.code, Code::CONTENT);
    assert_eq!(response.payload, b"hello mesh");

    // A reply larger than one frame crosses fragmented in both directions.
    let large = vec![0x5A; 700];
    let request = CoapMessage::request(Code::POST, "echo", large.clone());
    let response = node.handle.send_priority_request(ROOT, request, false).await.unwrap();
    assert_eq!(response.payload, large);

    node.task.shutdown();
    root.task.shutdown();
    let node = node.task.join().await.unwrap();
    let root = root.task.join().await.unwrap();
    assert!(node.neighbors().by_addr(&ROOT).is_some_and(|e| e.is_authenticated()));
    assert!(root.neighbors().by_addr(&NODE).is_some_and(|e| e.is_authenticated()));
}

#[tokio::test(start_paused = true)]
async fn test_request_without_route_fails_fast() {
    let stack = MeshStack::new(config(NODE, DodagRole::Router), NullRadio).unwrap();
    let (handle, task) = spawn_interface(stack, RunnerOptions::default());

    let result = handle.send_request(ROOT, status_request(), true).await;
    assert!(matches!(result, Err(FailureReason::Unreachable)));

    task.shutdown();
    task.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_hands_back_the_stack() {
    let stack = MeshStack::new(config(NODE, DodagRole::Router), MemoryRadio::new()).unwrap();
    let (handle, task) = spawn_interface(stack, RunnerOptions::default());

    tokio::time::sleep(Duration::from_millis(350)).await;
    task.shutdown_handle().shutdown();
    let stack = task.join().await.unwrap();
    assert_eq!(stack.link_addr(), NODE);
    // the discovery advertisement from the first tick
    assert!(!stack.radio().sent().is_empty());

    let result = handle.send_request(ROOT, status_request(), true).await;
    assert!(matches!(result, Err(FailureReason::Unreachable)));
}

#[tokio::test(start_paused = true)]
async fn test_group_key_and_counter_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::new(dir.path().to_path_buf()).unwrap();

    let root = MeshStack::new(config(ROOT, DodagRole::BorderRouter), NullRadio).unwrap();
    let original = root.group_key().cloned().unwrap();
    let options = RunnerOptions {
        storage: Some(storage.clone()),
        ..RunnerOptions::default()
    };
    let (_handle, task) = spawn_interface(root, options.clone());
    tokio::time::sleep(Duration::from_millis(300)).await;
    task.shutdown();
    task.join().await.unwrap();

    let saved = storage.load_group_key().await.unwrap().unwrap();
    assert_eq!(saved.index, original.index);
    assert_eq!(saved.key, original.key);
    let counter = storage.load_frame_counter().await.unwrap().unwrap();
    assert!(counter.high_water >= FRAME_COUNTER_MARGIN);

    // A differently seeded root generates another key, then adopts the
    // stored one before its first advertisement.
    let mut reseeded = config(ROOT, DodagRole::BorderRouter);
    reseeded.seed = Some(99);
    let root = MeshStack::new(reseeded, MemoryRadio::new()).unwrap();
    assert_ne!(root.group_key().map(|g| g.key), Some(original.key));

    let (_handle, task) = spawn_interface(root, options);
    tokio::time::sleep(Duration::from_millis(50)).await;
    task.shutdown();
    let root = task.join().await.unwrap();

    assert_eq!(root.group_key().map(|g| g.key), Some(original.key));
    let first = MacFrame::parse(&root.radio().sent()[0].bytes).unwrap();
    assert!(first.security.unwrap().frame_counter >= counter.high_water);
}

#[tokio::test(start_paused = true)]
async fn test_events_are_forwarded_to_the_application() {
    let (mut root, node) = spawn_pair();

    let event = wait_for(&mut root.task.events, |e| {
        matches!(e, StackEvent::NeighborStateChanged { neighbor, .. } if *neighbor == NODE)
    })
    .await;
    assert_eq!(
        event,
        StackEvent::NeighborStateChanged {
            neighbor: NODE,
            from: TrustState::Unauthenticated,
            to: TrustState::HandshakeInProgress,
        }
    );
    wait_for(&mut root.task.events, authenticated_with(NODE)).await;

    root.task.shutdown();
    node.task.shutdown();
    root.task.join().await.unwrap();
    node.task.join().await.unwrap();
}
