//! Room session: one live connection, its receive loop and the cached room
//! state.
//!
//! [`RoomSession`] is the handle the application keeps. [`join`](RoomSession::join)
//! opens a connection through a [`Connector`], waits for the first
//! [`RoomSnapshot`], and spawns a background loop that owns the transport.
//! The loop replaces the cached snapshot with every message the server pushes
//! and publishes a [`RoomEvent`] per snapshot on a bounded channel returned by
//! [`RoomSession::new`]. Commands are handed to the loop, which writes them to
//! the transport and reports the write result back to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env();
//! let (session, mut events) = RoomSession::websocket(config)?;
//!
//! let snapshot = session.join("my-room").await?;
//! println!("now playing: {:?}", snapshot.current);
//! session.toggle_play_pause().await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         RoomEvent::RoomState(snapshot) => { /* … */ }
//!         RoomEvent::SessionClosed { .. } => break,
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::RoomApi;
use crate::cache::SnapshotCache;
use crate::config::ClientConfig;
use crate::error::{Result, RoomClientError};
use crate::event::{CloseReason, RoomEvent};
use crate::protocol::{Command, RoomId, RoomSnapshot, VideoItem};
use crate::transport::{Connector, Transport};

/// Close reason sent when `join` replaces a live connection.
pub const RECONNECT_REASON: &str = "reconnect";

/// Close reason sent by [`RoomSession::close`].
pub const CLIENT_CLOSED_REASON: &str = "client closed";

const HANDSHAKE_FAILED_REASON: &str = "handshake failed";
const SEND_FAILED_REASON: &str = "send failed";
const MALFORMED_SNAPSHOT_REASON: &str = "malformed room snapshot";

// ── Session state ───────────────────────────────────────────────────

/// Lifecycle of a session's connection.
///
/// `Disconnected → Connecting → Streaming → Closed`; a new
/// [`join`](RoomSession::join) starts over from `Connecting`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No connection has been opened yet, or the previous one was torn down
    /// for a reconnect.
    Disconnected,
    /// `join` is opening the connection or waiting for the first snapshot.
    Connecting,
    /// The receive loop is running; carries the latest snapshot.
    Streaming(Arc<RoomSnapshot>),
    /// The connection ended.
    Closed(CloseReason),
}

impl SessionState {
    /// Returns `true` while the receive loop is running.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the session handle and every receive loop.
struct Shared {
    cache: SnapshotCache,
    state_tx: watch::Sender<SessionState>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

/// A command waiting to be written by the receive loop.
struct CommandRequest {
    command: Command,
    reply: oneshot::Sender<Result<()>>,
}

/// The parts of a live connection that command operations need.
#[derive(Clone)]
struct CommandHandle {
    room_id: RoomId,
    cmd_tx: mpsc::UnboundedSender<CommandRequest>,
    alive: Arc<AtomicBool>,
}

impl CommandHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// Ownership of a live connection's receive loop.
struct LiveConnection {
    room_id: RoomId,
    alive: Arc<AtomicBool>,
    shutdown_tx: oneshot::Sender<String>,
    /// Fires once the loop has closed its transport and published `Closed`.
    closed_rx: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

/// What the session's connection slot holds.
enum Link {
    Idle,
    /// A `join` is connecting or waiting for the first snapshot. It runs
    /// without the lifecycle lock and stops when `cancel_tx` fires.
    Connecting {
        attempt: u64,
        cancel_tx: oneshot::Sender<String>,
    },
    Live(LiveConnection),
}

struct Lifecycle {
    link: Link,
    attempts: u64,
}

impl Lifecycle {
    fn is_attempt(&self, attempt: u64) -> bool {
        matches!(self.link, Link::Connecting { attempt: current, .. } if current == attempt)
    }
}

// ── Session handle ──────────────────────────────────────────────────

/// Client-side session for one room at a time.
///
/// At most one connection is live per session: joining again closes the
/// previous connection (reason `"reconnect"`) before opening the new one.
/// There is no automatic reconnect; after the connection ends the state is
/// [`SessionState::Closed`] and a [`RoomEvent::SessionClosed`] is published.
pub struct RoomSession<C: Connector> {
    connector: C,
    api: RoomApi,
    config: ClientConfig,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<RoomEvent>,
    /// Taken by `join` and `close` for slot transitions, never across the
    /// connect or handshake I/O.
    lifecycle: Mutex<Lifecycle>,
    /// Published for commands; only written while `lifecycle` is held.
    commands: RwLock<Option<CommandHandle>>,
}

impl<C: Connector> RoomSession<C> {
    /// Create a disconnected session and the receiver for its events.
    ///
    /// The receiver yields [`RoomEvent`]s in the order the server sent the
    /// snapshots, across every connection this session opens.
    #[must_use = "the event receiver must be used to receive room events"]
    pub fn new(
        connector: C,
        api: RoomApi,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let (state_tx, _) = watch::channel(SessionState::Disconnected);

        let session = Self {
            connector,
            api,
            config,
            shared: Arc::new(Shared {
                cache: SnapshotCache::new(),
                state_tx,
            }),
            event_tx,
            lifecycle: Mutex::new(Lifecycle {
                link: Link::Idle,
                attempts: 0,
            }),
            commands: RwLock::new(None),
        };
        (session, event_rx)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Connect to `room_id`, wait for its first snapshot and start streaming.
    ///
    /// Returns the handshake snapshot. It is installed in the cache before
    /// the receive loop starts, and is not published as a
    /// [`RoomEvent::RoomState`]; events only follow for later snapshots.
    ///
    /// # Errors
    ///
    /// - [`RoomClientError::Connect`] / [`RoomClientError::InvalidUrl`] if the
    ///   connection cannot be opened
    /// - [`RoomClientError::Timeout`] if connecting or the first snapshot
    ///   exceeds its bound
    /// - [`RoomClientError::Handshake`] if the first message is missing or is
    ///   not a room snapshot
    /// - [`RoomClientError::Cancelled`] if [`close`](Self::close) or another
    ///   `join` interrupts this one first
    pub async fn join(&self, room_id: impl Into<RoomId>) -> Result<Arc<RoomSnapshot>> {
        let room_id = room_id.into();

        let (attempt, mut cancel_rx) = {
            let mut lifecycle = self.lifecycle.lock().await;
            let previous = std::mem::replace(&mut lifecycle.link, Link::Idle);
            if self.release(previous, RECONNECT_REASON).await {
                self.shared.set_state(SessionState::Disconnected);
            }

            lifecycle.attempts += 1;
            let attempt = lifecycle.attempts;
            let (cancel_tx, cancel_rx) = oneshot::channel();
            lifecycle.link = Link::Connecting { attempt, cancel_tx };
            self.shared.set_state(SessionState::Connecting);
            (attempt, cancel_rx)
        };
        debug!(room = %room_id, attempt, "connecting to room");

        let connected = tokio::select! {
            biased;
            cancelled = &mut cancel_rx => {
                let reason = cancel_reason(cancelled);
                info!(room = %room_id, %reason, "join cancelled while connecting");
                return Err(RoomClientError::Cancelled(reason));
            }
            connected = tokio::time::timeout(
                self.config.connect_timeout,
                self.connector.connect(&room_id),
            ) => connected,
        };
        let mut transport = match connected {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                warn!(room = %room_id, "room connection failed: {e}");
                self.fail_attempt(attempt, CloseReason::Connect(e.to_string()))
                    .await;
                return Err(e);
            }
            Err(_) => {
                warn!(room = %room_id, "room connection timed out");
                self.fail_attempt(attempt, CloseReason::Connect("timed out".to_string()))
                    .await;
                return Err(RoomClientError::Timeout);
            }
        };

        let handshake = tokio::select! {
            biased;
            cancelled = &mut cancel_rx => Err(cancel_reason(cancelled)),
            handshake = self.handshake(&mut transport) => Ok(handshake),
        };
        let snapshot = match handshake {
            Ok(Ok(snapshot)) => Arc::new(snapshot),
            Ok(Err(e)) => {
                warn!(room = %room_id, "room handshake failed: {e}");
                close_transport(&mut transport, HANDSHAKE_FAILED_REASON).await;
                self.fail_attempt(attempt, CloseReason::Handshake(e.to_string()))
                    .await;
                return Err(e);
            }
            Err(reason) => {
                info!(room = %room_id, %reason, "join cancelled during handshake");
                close_transport(&mut transport, &reason).await;
                return Err(RoomClientError::Cancelled(reason));
            }
        };

        let mut lifecycle = self.lifecycle.lock().await;
        if !lifecycle.is_attempt(attempt) {
            // Cancelled after the handshake finished but before we got here.
            drop(lifecycle);
            let reason = cancel_reason(cancel_rx.try_recv());
            info!(room = %room_id, %reason, "join cancelled after handshake");
            close_transport(&mut transport, &reason).await;
            return Err(RoomClientError::Cancelled(reason));
        }

        self.shared.cache.set(Arc::clone(&snapshot));
        self.shared
            .set_state(SessionState::Streaming(Arc::clone(&snapshot)));

        let alive = Arc::new(AtomicBool::new(true));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        let task = tokio::spawn(receive_loop(
            transport,
            cmd_rx,
            shutdown_rx,
            closed_tx,
            LoopContext {
                room_id: room_id.clone(),
                shared: Arc::clone(&self.shared),
                event_tx: self.event_tx.clone(),
                alive: Arc::clone(&alive),
            },
        ));

        *self.commands.write() = Some(CommandHandle {
            room_id: room_id.clone(),
            cmd_tx,
            alive: Arc::clone(&alive),
        });
        lifecycle.link = Link::Live(LiveConnection {
            room_id: room_id.clone(),
            alive,
            shutdown_tx,
            closed_rx,
            task,
        });

        info!(room = %room_id, queued = snapshot.queue.len(), "joined room");
        Ok(snapshot)
    }

    /// Close the current connection with reason `"client closed"`.
    ///
    /// A `join` still connecting is cancelled and its transport closed.
    /// Idempotent: without a connection this is a no-op. The last cached
    /// snapshot stays readable.
    pub async fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let link = std::mem::replace(&mut lifecycle.link, Link::Idle);
        if !self.release(link, CLIENT_CLOSED_REASON).await {
            debug!("close requested without a connection");
        }
        Ok(())
    }

    /// Tear down whatever `link` holds with `reason`.
    ///
    /// Returns `false` if there was nothing to tear down. Called with the
    /// lifecycle lock held.
    async fn release(&self, link: Link, reason: &str) -> bool {
        match link {
            Link::Idle => false,
            Link::Connecting { attempt, cancel_tx } => {
                info!(attempt, %reason, "cancelling pending join");
                // Fails only if that join already gave up on its own.
                let _ = cancel_tx.send(reason.to_string());
                self.shared
                    .set_state(SessionState::Closed(CloseReason::Local(reason.to_string())));
                true
            }
            Link::Live(connection) => {
                let room_id = connection.room_id.clone();
                self.shutdown_connection(connection, reason).await;
                info!(room = %room_id, %reason, "room connection closed");
                true
            }
        }
    }

    /// Read the first message of a fresh connection as a room snapshot.
    async fn handshake(&self, transport: &mut C::Transport) -> Result<RoomSnapshot> {
        let first = tokio::time::timeout(self.config.handshake_timeout, transport.recv()).await;
        match first {
            Err(_) => Err(RoomClientError::Timeout),
            Ok(None) => Err(RoomClientError::Handshake(
                "connection closed before the first room snapshot".to_string(),
            )),
            Ok(Some(Err(e))) => Err(RoomClientError::Handshake(e.to_string())),
            Ok(Some(Ok(text))) => serde_json::from_str(&text)
                .map_err(|e| RoomClientError::Handshake(format!("{MALFORMED_SNAPSHOT_REASON}: {e}"))),
        }
    }

    /// Record a failed `join` unless a newer transition replaced it.
    async fn fail_attempt(&self, attempt: u64, reason: CloseReason) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_attempt(attempt) {
            lifecycle.link = Link::Idle;
            self.shared.set_state(SessionState::Closed(reason));
        }
    }

    /// Stop a connection's receive loop, closing its transport with `reason`.
    ///
    /// The shutdown signal goes out before the command handle is withdrawn,
    /// so the loop always sees `reason`. If the loop does not report its
    /// close within `shutdown_timeout` it is aborted and the close is
    /// published here instead.
    async fn shutdown_connection(&self, connection: LiveConnection, reason: &str) {
        let LiveConnection {
            room_id,
            alive,
            shutdown_tx,
            closed_rx,
            mut task,
        } = connection;

        // Fails only if the loop already ended on its own.
        let _ = shutdown_tx.send(reason.to_string());
        self.commands.write().take();

        let reported = match tokio::time::timeout(self.config.shutdown_timeout, closed_rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!(room = %room_id, "receive loop ended without reporting its close");
                false
            }
            Err(_) => {
                warn!(room = %room_id, "receive loop did not close within timeout; aborting task");
                false
            }
        };
        alive.store(false, Ordering::Release);
        if reported {
            // The task may still be delivering its last events; leave it be.
            return;
        }

        task.abort();
        if let Err(join_err) = (&mut task).await {
            debug!("receive loop aborted: {join_err}");
        }
        self.publish_local_close(reason).await;
    }

    /// Publish `Closed(Local(reason))` and its event on behalf of a loop that
    /// could not.
    async fn publish_local_close(&self, reason: &str) {
        let reason = CloseReason::Local(reason.to_string());
        self.shared.set_state(SessionState::Closed(reason.clone()));
        let event = RoomEvent::SessionClosed { reason };
        match tokio::time::timeout(self.config.shutdown_timeout, self.event_tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("event channel closed, receiver dropped"),
            Err(_) => warn!("event channel full, session close not delivered"),
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Send `Pause` if the cached snapshot says the room is playing,
    /// otherwise `Play`. Returns the command that was sent.
    ///
    /// The decision uses the last snapshot this session has applied; a newer
    /// one may already be in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::NotConnected`] without touching the network
    /// if there is no live connection, or the transport's error if the write
    /// fails.
    pub async fn toggle_play_pause(&self) -> Result<Command> {
        let command = match self.shared.cache.get() {
            Some(snapshot) if snapshot.playing => Command::Pause,
            _ => Command::Play,
        };
        self.send_command(command).await?;
        Ok(command)
    }

    /// Ask the server to skip to the next queued item.
    ///
    /// # Errors
    ///
    /// Same as [`toggle_play_pause`](Self::toggle_play_pause).
    pub async fn next(&self) -> Result<()> {
        self.send_command(Command::Next).await
    }

    /// Hand `command` to the live connection and wait for the write result.
    async fn send_command(&self, command: Command) -> Result<()> {
        let handle = self.live_handle()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(CommandRequest {
                command,
                reply: reply_tx,
            })
            .map_err(|_| RoomClientError::NotConnected)?;
        debug!(room = %handle.room_id, ?command, "command queued");
        // A dropped reply means the loop ended before writing it.
        reply_rx.await.map_err(|_| RoomClientError::NotConnected)?
    }

    /// The single "is there a live connection" guard for every command.
    fn live_handle(&self) -> Result<CommandHandle> {
        match self.commands.read().as_ref() {
            Some(handle) if handle.is_alive() => Ok(handle.clone()),
            _ => Err(RoomClientError::NotConnected),
        }
    }

    // ── Room operations ─────────────────────────────────────────────

    /// Append `video` to the current room's queue. When nothing is loaded
    /// yet, also sends `Next` so playback starts with it.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::NoRoomState`] before the first snapshot,
    /// or the API / command error.
    pub async fn enqueue(&self, video: &VideoItem) -> Result<()> {
        let room_id = self.require_snapshot()?.room_id.clone();
        self.api.enqueue(&room_id, video).await?;

        let idle = self
            .shared
            .cache
            .get()
            .is_some_and(|snapshot| snapshot.current.is_none());
        if idle {
            debug!(room = %room_id, "room idle after enqueue, advancing");
            self.next().await?;
        }
        Ok(())
    }

    /// Remove the queue entry at `index` from the current room.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::NoRoomState`] before the first snapshot,
    /// or the API error.
    pub async fn remove_from_queue(&self, index: usize) -> Result<()> {
        let snapshot = self.require_snapshot()?;
        self.api.remove_from_queue(&snapshot.room_id, index).await
    }

    /// Seek the current item to `position` seconds. Does nothing when no
    /// item is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::NoRoomState`] before the first snapshot,
    /// or the API error.
    pub async fn seek(&self, position: f64) -> Result<()> {
        let snapshot = self.require_snapshot()?;
        if snapshot.current.is_none() {
            debug!(room = %snapshot.room_id, "seek ignored, nothing loaded");
            return Ok(());
        }
        self.api.seek(&snapshot.room_id, position).await
    }

    fn require_snapshot(&self) -> Result<Arc<RoomSnapshot>> {
        self.shared.cache.get().ok_or(RoomClientError::NoRoomState)
    }

    // ── State accessors ─────────────────────────────────────────────

    /// The cached room snapshot, if any has been received.
    pub fn snapshot(&self) -> Option<Arc<RoomSnapshot>> {
        self.shared.cache.get()
    }

    /// The room of the cached snapshot.
    pub fn room_id(&self) -> Option<RoomId> {
        self.shared.cache.get().map(|snapshot| snapshot.room_id.clone())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Returns `true` if a connection is live and its loop is running.
    pub fn is_connected(&self) -> bool {
        self.live_handle().is_ok()
    }

    /// The REST client this session uses for room operations.
    pub fn api(&self) -> &RoomApi {
        &self.api
    }

    /// The configuration this session was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(feature = "transport-websocket")]
impl RoomSession<crate::transports::WebSocketConnector> {
    /// Build a WebSocket-backed session and its API client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::InvalidUrl`] if `config.base_url` is not a
    /// usable HTTP(S) URL, or [`RoomClientError::Http`] if the HTTP client
    /// cannot be built.
    pub fn websocket(config: ClientConfig) -> Result<(Self, mpsc::Receiver<RoomEvent>)> {
        let connector = crate::transports::WebSocketConnector::new(&config.base_url)?;
        let api = RoomApi::new(&config)?;
        Ok(Self::new(connector, api, config))
    }
}

impl<C: Connector> std::fmt::Debug for RoomSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSession")
            .field("base_url", &self.config.base_url)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<C: Connector> Drop for RoomSession<C> {
    fn drop(&mut self) {
        // No executor context for a graceful close here; abort the loop so
        // the transport is dropped with it.
        if let Link::Live(connection) = &self.lifecycle.get_mut().link {
            connection.alive.store(false, Ordering::Release);
            connection.task.abort();
        }
    }
}

// ── Receive loop ────────────────────────────────────────────────────

struct LoopContext {
    room_id: RoomId,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<RoomEvent>,
    alive: Arc<AtomicBool>,
}

fn cancel_reason<E>(received: std::result::Result<String, E>) -> String {
    received.unwrap_or_else(|_| CLIENT_CLOSED_REASON.to_string())
}

async fn close_transport(transport: &mut impl Transport, reason: &str) {
    if let Err(e) = transport.close(reason).await {
        debug!(%reason, "transport close failed: {e}");
    }
}

/// Background loop bound to one connection.
///
/// Exits when:
/// - Shutdown is requested (`join` reconnecting, `close`)
/// - The transport returns `None` (server closed the connection)
/// - Reading or writing fails
/// - A message is not a room snapshot
///
/// A snapshot waiting for room in the event channel pauses reading but not
/// commands or shutdown.
async fn receive_loop(
    mut transport: impl Transport,
    mut cmd_rx: mpsc::UnboundedReceiver<CommandRequest>,
    mut shutdown_rx: oneshot::Receiver<String>,
    closed_tx: oneshot::Sender<()>,
    ctx: LoopContext,
) {
    debug!(room = %ctx.room_id, "receive loop started");
    let mut pending: Option<RoomEvent> = None;

    let reason = loop {
        tokio::select! {
            biased;

            // Branch 1: shutdown from the session handle
            requested = &mut shutdown_rx => {
                let reason = cancel_reason(requested);
                debug!(%reason, "shutdown requested");
                close_transport(&mut transport, &reason).await;
                break CloseReason::Local(reason);
            }

            // Branch 2: outgoing command
            request = cmd_rx.recv() => {
                let Some(CommandRequest { command, reply }) = request else {
                    // The handle is withdrawn only after the shutdown signal.
                    let reason = cancel_reason((&mut shutdown_rx).await);
                    debug!(%reason, "command channel closed");
                    close_transport(&mut transport, &reason).await;
                    break CloseReason::Local(reason);
                };
                let json = match serde_json::to_string(&command) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize command: {e}");
                        let _ = reply.send(Err(e.into()));
                        continue;
                    }
                };
                match transport.send(json).await {
                    Ok(()) => {
                        debug!(?command, "command sent");
                        let _ = reply.send(Ok(()));
                    }
                    Err(e) => {
                        error!("transport send error: {e}");
                        let reason = CloseReason::Transport(e.to_string());
                        let _ = reply.send(Err(e));
                        close_transport(&mut transport, SEND_FAILED_REASON).await;
                        break reason;
                    }
                }
            }

            // Branch 3: hand the applied snapshot to the observer
            permit = ctx.event_tx.reserve(), if pending.is_some() => {
                match permit {
                    Ok(permit) => {
                        if let Some(event) = pending.take() {
                            permit.send(event);
                        }
                    }
                    Err(_) => {
                        debug!("event channel closed, receiver dropped");
                        pending = None;
                    }
                }
            }

            // Branch 4: room snapshot from the server
            incoming = transport.recv(), if pending.is_none() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<RoomSnapshot>(&text) {
                        Ok(snapshot) => pending = Some(apply_snapshot(&ctx, Arc::new(snapshot))),
                        Err(e) => {
                            error!("failed to decode room snapshot: {e}, raw: {text}");
                            close_transport(&mut transport, MALFORMED_SNAPSHOT_REASON).await;
                            break CloseReason::Decode(e.to_string());
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        break CloseReason::Transport(e.to_string());
                    }
                    None => {
                        debug!("transport closed by server");
                        break CloseReason::Remote;
                    }
                }
            }
        }
    };

    ctx.alive.store(false, Ordering::Release);
    info!(room = %ctx.room_id, %reason, "room connection ended");
    ctx.shared.set_state(SessionState::Closed(reason.clone()));
    // Nobody waits for this when the loop ended on its own.
    let _ = closed_tx.send(());

    // Blocking sends: received snapshots and the close signal are never dropped.
    let remaining = pending
        .into_iter()
        .chain(std::iter::once(RoomEvent::SessionClosed { reason }));
    for event in remaining {
        if ctx.event_tx.send(event).await.is_err() {
            debug!("event channel closed, receiver dropped");
            break;
        }
    }
}

/// Install `snapshot` in the cache and state, returning its event.
fn apply_snapshot(ctx: &LoopContext, snapshot: Arc<RoomSnapshot>) -> RoomEvent {
    ctx.shared.cache.set(Arc::clone(&snapshot));
    ctx.shared
        .set_state(SessionState::Streaming(Arc::clone(&snapshot)));
    debug!(
        room = %ctx.room_id,
        playing = snapshot.playing,
        position = snapshot.position_seconds,
        "room state updated"
    );
    RoomEvent::RoomState(snapshot)
}
