#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for listening room client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] driven by a [`ServerHandle`],
//! a scripted [`MockConnector`], a minimal HTTP server for the REST API, and
//! helpers for building room snapshots.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use listening_room_client::{
    ClientConfig, Command, Connector, RoomApi, RoomClientError, RoomEvent, RoomId, RoomSession,
    RoomSnapshot, Transport, VideoItem,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type Incoming = Option<Result<String, RoomClientError>>;

/// REST base URL for sessions whose tests never reach the API.
pub const UNREACHABLE_API: &str = "http://127.0.0.1:1";

// ── MockTransport ───────────────────────────────────────────────────

/// A channel-backed mock transport.
///
/// Whatever the paired [`ServerHandle`] pushes is returned by `recv()` in
/// order; with nothing pushed, `recv()` waits, like an idle connection.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    close_reasons: Arc<StdMutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    hang_close: Arc<AtomicBool>,
}

/// The server side of a [`MockTransport`].
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    close_reasons: Arc<StdMutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    hang_close: Arc<AtomicBool>,
}

/// Create a connected transport and the handle that scripts its server side.
pub fn mock_connection() -> (MockTransport, ServerHandle) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let close_reasons = Arc::new(StdMutex::new(Vec::new()));
    let fail_sends = Arc::new(AtomicBool::new(false));
    let hang_close = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        incoming,
        sent: Arc::clone(&sent),
        close_reasons: Arc::clone(&close_reasons),
        fail_sends: Arc::clone(&fail_sends),
        hang_close: Arc::clone(&hang_close),
    };
    let server = ServerHandle {
        tx,
        sent,
        close_reasons,
        fail_sends,
        hang_close,
    };
    (transport, server)
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomClientError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(RoomClientError::TransportSend("broken pipe".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, RoomClientError>> {
        // A dropped server handle counts as a clean close.
        self.incoming.recv().await.flatten()
    }

    async fn close(&mut self, reason: &str) -> Result<(), RoomClientError> {
        self.close_reasons.lock().unwrap().push(reason.to_string());
        if self.hang_close.load(Ordering::Relaxed) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

impl ServerHandle {
    /// Push a room snapshot to the client.
    pub fn push_snapshot(&self, snapshot: &RoomSnapshot) {
        self.push_raw(&serde_json::to_string(snapshot).unwrap());
    }

    /// Push arbitrary text to the client.
    pub fn push_raw(&self, text: &str) {
        let _ = self.tx.send(Some(Ok(text.to_string())));
    }

    /// Close the connection cleanly from the server side.
    pub fn push_close(&self) {
        let _ = self.tx.send(None);
    }

    /// Fail the next read with a transport error.
    pub fn push_error(&self, message: &str) {
        let _ = self
            .tx
            .send(Some(Err(RoomClientError::TransportReceive(message.into()))));
    }

    /// Make every following client write fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Relaxed);
    }

    /// Make `close()` record its reason and then never complete.
    pub fn hang_close(&self) {
        self.hang_close.store(true, Ordering::Relaxed);
    }

    /// Commands the client has written, decoded.
    pub fn commands(&self) -> Vec<Command> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|json| serde_json::from_str(json).unwrap())
            .collect()
    }

    /// Raw messages the client has written.
    pub fn sent_raw(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Reasons passed to `close()`, in call order.
    pub fn close_reasons(&self) -> Vec<String> {
        self.close_reasons.lock().unwrap().clone()
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// What the next `connect()` call does.
pub enum ConnectOutcome {
    /// Hand out this transport.
    Accept(MockTransport),
    /// Fail with [`RoomClientError::Connect`].
    Refuse(String),
    /// Never complete.
    Hang,
}

/// A connector that replays scripted outcomes and records the rooms asked for.
pub struct MockConnector {
    outcomes: StdMutex<VecDeque<ConnectOutcome>>,
    rooms: Arc<StdMutex<Vec<RoomId>>>,
}

impl MockConnector {
    pub fn new(outcomes: Vec<ConnectOutcome>) -> (Self, Arc<StdMutex<Vec<RoomId>>>) {
        let rooms = Arc::new(StdMutex::new(Vec::new()));
        let connector = Self {
            outcomes: StdMutex::new(VecDeque::from(outcomes)),
            rooms: Arc::clone(&rooms),
        };
        (connector, rooms)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, room_id: &RoomId) -> Result<MockTransport, RoomClientError> {
        self.rooms.lock().unwrap().push(room_id.clone());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(ConnectOutcome::Accept(transport)) => Ok(transport),
            Some(ConnectOutcome::Refuse(message)) => Err(RoomClientError::Connect(message)),
            Some(ConnectOutcome::Hang) => std::future::pending().await,
            None => Err(RoomClientError::Connect("no scripted connection".into())),
        }
    }
}

// ── Session helpers ─────────────────────────────────────────────────

/// Short timeouts so failure paths finish quickly.
pub fn test_config(base_url: &str) -> ClientConfig {
    ClientConfig::new(base_url)
        .with_connect_timeout(Duration::from_millis(200))
        .with_handshake_timeout(Duration::from_millis(200))
        .with_shutdown_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_secs(2))
}

/// Start a session over `outcomes` with an explicit configuration.
#[allow(clippy::type_complexity)]
pub fn start_session_with_config(
    outcomes: Vec<ConnectOutcome>,
    config: ClientConfig,
) -> (
    RoomSession<MockConnector>,
    mpsc::Receiver<RoomEvent>,
    Arc<StdMutex<Vec<RoomId>>>,
) {
    let (connector, rooms) = MockConnector::new(outcomes);
    let api = RoomApi::new(&config).unwrap();
    let (session, events) = RoomSession::new(connector, api, config);
    (session, events, rooms)
}

/// Start a session over `outcomes`; the REST API points at `base_url`.
#[allow(clippy::type_complexity)]
pub fn start_session_with_api(
    outcomes: Vec<ConnectOutcome>,
    base_url: &str,
) -> (
    RoomSession<MockConnector>,
    mpsc::Receiver<RoomEvent>,
    Arc<StdMutex<Vec<RoomId>>>,
) {
    start_session_with_config(outcomes, test_config(base_url))
}

/// Start a session over `outcomes` with an unreachable REST API.
#[allow(clippy::type_complexity)]
pub fn start_session(
    outcomes: Vec<ConnectOutcome>,
) -> (
    RoomSession<MockConnector>,
    mpsc::Receiver<RoomEvent>,
    Arc<StdMutex<Vec<RoomId>>>,
) {
    start_session_with_api(outcomes, UNREACHABLE_API)
}

/// Receive the next event, failing the test after two seconds.
pub async fn next_event(events: &mut mpsc::Receiver<RoomEvent>) -> RoomEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for a room event")
        .expect("event channel closed")
}

// ── Snapshot helpers ────────────────────────────────────────────────

pub fn video(n: u64) -> VideoItem {
    VideoItem::new(format!("https://videos.example/{n}"), format!("Track {n}"), 180 + n)
}

pub fn snapshot(
    room: &str,
    current: Option<VideoItem>,
    playing: bool,
    position: f64,
) -> RoomSnapshot {
    RoomSnapshot {
        room_id: RoomId::new(room),
        current,
        queue: vec![],
        playing,
        position_seconds: position,
        updated_at: "2025-05-01T12:00:00Z".into(),
    }
}

/// An idle room: nothing loaded, empty queue, paused at zero.
pub fn idle_snapshot(room: &str) -> RoomSnapshot {
    snapshot(room, None, false, 0.0)
}

// ── HTTP mock ───────────────────────────────────────────────────────

/// One request seen by the HTTP mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query, e.g. `/api/v1/rooms/seek?id=r1&pos=12.50`.
    pub target: String,
    pub body: String,
}

/// Start an HTTP server that answers one connection per scripted
/// `(status, body)` pair and records each request.
pub async fn start_http_server(
    responses: Vec<(u16, &str)>,
) -> (String, Arc<StdMutex<Vec<RecordedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(StdMutex::new(Vec::new()));
    let recorded = Arc::clone(&requests);
    let responses: Vec<(u16, String)> = responses
        .into_iter()
        .map(|(status, body)| (status, body.to_string()))
        .collect();

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let mut reader = BufReader::new(stream);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).await.unwrap();
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let target = parts.next().unwrap_or_default().to_string();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).await.unwrap();

            recorded.lock().unwrap().push(RecordedRequest {
                method,
                target,
                body: String::from_utf8(request_body).unwrap(),
            });

            let reason = if status == 200 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{addr}"), requests)
}
