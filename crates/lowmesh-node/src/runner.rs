//! Tokio runner for one interface.
//!
//! A single task owns the [`MeshStack`] and selects over the application
//! command queue, the radio receive channel and a maintenance interval.
//! Applications only ever talk to it through [`InterfaceHandle`]; replies
//! travel back on a per-request `oneshot`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use lowmesh_core::{LinkAddr, Timestamp};
use lowmesh_protocol::coap::{CoapMessage, TransactionHandle};

use crate::error::NodeError;
use crate::events::{FailureReason, StackEvent};
use crate::radio::{RadioDriver, RxFrame};
use crate::stack::MeshStack;
use crate::storage::Storage;

const COMMAND_QUEUE_DEPTH: usize = 32;
const RADIO_QUEUE_DEPTH: usize = 64;
const EVENT_QUEUE_DEPTH: usize = 256;

pub const DEFAULT_TICK_MS: u64 = 100;

type Reply = oneshot::Sender<Result<CoapMessage, FailureReason>>;

/// Work handed to the interface task.
#[derive(Debug)]
pub enum Command {
    SendRequest {
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
        priority: bool,
        reply: Reply,
    },
}

/// Application side of an interface. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InterfaceHandle {
    commands: mpsc::Sender<Command>,
}

impl InterfaceHandle {
    pub fn new(commands: mpsc::Sender<Command>) -> Self {
        Self { commands }
    }

    /// Send a request and wait for its response.
    ///
    /// Dropping the returned future cancels the transaction on the
    /// interface's next tick.
    pub async fn send_request(
        &self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
    ) -> Result<CoapMessage, FailureReason> {
        self.submit(destination, request, confirmable, false).await
    }

    /// Like [`InterfaceHandle::send_request`], admitted under high memory
    /// pressure.
    pub async fn send_priority_request(
        &self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
    ) -> Result<CoapMessage, FailureReason> {
        self.submit(destination, request, confirmable, true).await
    }

    async fn submit(
        &self,
        destination: LinkAddr,
        request: CoapMessage,
        confirmable: bool,
        priority: bool,
    ) -> Result<CoapMessage, FailureReason> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::SendRequest {
                destination,
                request,
                confirmable,
                priority,
                reply,
            })
            .await
            .map_err(|_| FailureReason::Unreachable)?;
        // The task stopped before answering.
        response.await.unwrap_or(Err(FailureReason::Unreachable))
    }
}

/// Tells a running interface to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Maintenance tick period.
    pub tick_ms: u64,
    /// `None` runs without persistence.
    pub storage: Option<Storage>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            storage: None,
        }
    }
}

/// Channel ends consumed by [`run_interface`].
#[derive(Debug)]
pub struct InterfaceIo {
    pub commands: mpsc::Receiver<Command>,
    pub radio_rx: mpsc::Receiver<RxFrame>,
    /// Every stack event is also offered here when set. A full channel
    /// drops events rather than stalling the interface.
    pub events: Option<mpsc::Sender<StackEvent>>,
    pub shutdown: watch::Receiver<bool>,
}

/// A spawned interface task and the channels to reach it.
pub struct InterfaceTask<R: RadioDriver> {
    /// Inject received frames, as a radio driver would.
    pub radio_tx: mpsc::Sender<RxFrame>,
    pub events: mpsc::Receiver<StackEvent>,
    shutdown: ShutdownHandle,
    join: JoinHandle<Result<MeshStack<R>, NodeError>>,
}

impl<R: RadioDriver> InterfaceTask<R> {
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for the task to stop and take the stack back.
    pub async fn join(self) -> Result<MeshStack<R>, NodeError> {
        self.join.await.map_err(|_| NodeError::InterfaceClosed)?
    }
}

/// Spawn [`run_interface`] on the current runtime with fresh channels.
pub fn spawn_interface<R>(stack: MeshStack<R>, options: RunnerOptions) -> (InterfaceHandle, InterfaceTask<R>)
where
    R: RadioDriver + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (radio_tx, radio_rx) = mpsc::channel(RADIO_QUEUE_DEPTH);
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let io = InterfaceIo {
        commands: command_rx,
        radio_rx,
        events: Some(event_tx),
        shutdown: shutdown_rx,
    };
    let join = tokio::spawn(run_interface(stack, io, options));

    (
        InterfaceHandle::new(command_tx),
        InterfaceTask {
            radio_tx,
            events: event_rx,
            shutdown: ShutdownHandle {
                tx: Arc::new(shutdown_tx),
            },
            join,
        },
    )
}

/// Drive `stack` until shutdown is signalled, then hand it back.
///
/// Persisted state is restored before the first tick and checkpointed after
/// every tick and once more on the way out.
pub async fn run_interface<R: RadioDriver>(
    mut stack: MeshStack<R>,
    mut io: InterfaceIo,
    options: RunnerOptions,
) -> Result<MeshStack<R>, NodeError> {
    let clock = Clock::start();
    let storage = options.storage.as_ref();

    if let Some(storage) = storage {
        restore(&mut stack, storage, clock.now()).await;
    }
    // The frame counter must be on disk before the first secured frame.
    persist(&mut stack, storage, clock.now()).await;

    let mut interval = tokio::time::interval(Duration::from_millis(options.tick_ms.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let mut pending: HashMap<TransactionHandle, Reply> = HashMap::new();
    let mut commands_open = true;
    let mut radio_open = true;

    info!(link_addr = %stack.link_addr(), tick_ms = options.tick_ms, "runner: interface started");
    stack.tick(clock.now());
    dispatch_events(&mut stack, &mut pending, io.events.as_ref());

    loop {
        tokio::select! {
            biased;

            _ = io.shutdown.changed() => {
                info!("runner: shutdown signal received");
                break;
            }

            frame = io.radio_rx.recv(), if radio_open => {
                match frame {
                    Some(frame) => {
                        // Drops are logged by the stack.
                        let _ = stack.frame_received(&frame.bytes, frame.channel, clock.now());
                    }
                    None => {
                        debug!("runner: radio channel closed");
                        radio_open = false;
                    }
                }
            }

            command = io.commands.recv(), if commands_open => {
                match command {
                    Some(command) => handle_command(&mut stack, &mut pending, command, clock.now()),
                    None => {
                        debug!("runner: all interface handles dropped");
                        commands_open = false;
                    }
                }
            }

            _ = interval.tick() => {
                let now = clock.now();
                // A dropped waiter cancels its transaction.
                pending.retain(|handle, reply| {
                    if reply.is_closed() {
                        stack.cancel_request(*handle);
                        false
                    } else {
                        true
                    }
                });
                stack.tick(now);
                persist(&mut stack, storage, now).await;
            }
        }
        dispatch_events(&mut stack, &mut pending, io.events.as_ref());
    }

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(FailureReason::Unreachable));
    }
    persist(&mut stack, storage, clock.now()).await;
    info!("runner: interface stopped");
    Ok(stack)
}

fn handle_command<R: RadioDriver>(
    stack: &mut MeshStack<R>,
    pending: &mut HashMap<TransactionHandle, Reply>,
    command: Command,
    now: Timestamp,
) {
    match command {
        Command::SendRequest {
            destination,
            request,
            confirmable,
            priority,
            reply,
        } => {
            let submitted = if priority {
                stack.send_priority_request(destination, request, confirmable, now)
            } else {
                stack.send_request(destination, request, confirmable, now)
            };
            match submitted {
                Ok(handle) => {
                    pending.insert(handle, reply);
                }
                Err(reason) => {
                    let _ = reply.send(Err(reason));
                }
            }
        }
    }
}

/// Settle waiting requests and forward every event to the application.
fn dispatch_events<R: RadioDriver>(
    stack: &mut MeshStack<R>,
    pending: &mut HashMap<TransactionHandle, Reply>,
    events: Option<&mpsc::Sender<StackEvent>>,
) {
    for event in stack.drain_events() {
        if let Some(reply) = event.transaction().and_then(|handle| pending.remove(&handle)) {
            let result = match &event {
                StackEvent::Response { response, .. } => Ok(response.clone()),
                StackEvent::RequestFailed { reason, .. } => Err(*reason),
                _ => Err(FailureReason::Unreachable),
            };
            let _ = reply.send(result);
        }
        if let Some(events) = events
            && let Err(err) = events.try_send(event)
        {
            debug!(%err, "runner: event dropped");
        }
    }
}

async fn restore<R: RadioDriver>(stack: &mut MeshStack<R>, storage: &Storage, now: Timestamp) {
    let group = match storage.load_group_key().await {
        Ok(group) => group,
        Err(e) => {
            warn!(%e, "runner: stored group key unreadable, ignoring");
            None
        }
    };
    let counter = match storage.load_frame_counter().await {
        Ok(counter) => counter,
        Err(e) => {
            warn!(%e, "runner: stored frame counter unreadable, ignoring");
            None
        }
    };
    stack.restore(group, counter, now);
}

async fn persist<R: RadioDriver>(stack: &mut MeshStack<R>, storage: Option<&Storage>, now: Timestamp) {
    let Some(storage) = storage else {
        return;
    };
    let checkpoint = stack.take_checkpoint(now);
    if let Some(record) = checkpoint.group_key
        && let Err(e) = storage.save_group_key(&record).await
    {
        warn!(%e, "runner: failed to persist group key");
    }
    if let Some(record) = checkpoint.frame_counter
        && let Err(e) = storage.save_frame_counter(record).await
    {
        warn!(%e, "runner: failed to persist frame counter");
    }
}

/// Milliseconds since the task started, matching the stack's zero-based
/// clock.
struct Clock {
    started: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        let ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Timestamp::from_millis(ms)
    }
}
