//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! This module provides [`WebSocketTransport`], a [`Transport`] implementation
//! that communicates over a WebSocket connection, and [`WebSocketConnector`],
//! which derives the room channel URL from the service's HTTP base URL.
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), listening_room_client::RoomClientError> {
//! use listening_room_client::{Connector, RoomId, Transport, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("http://localhost:8080")?;
//! let mut transport = connector.connect(&RoomId::new("my-room")).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("room state: {msg}");
//! }
//!
//! transport.close("bye").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use url::Url;

use crate::error::RoomClientError;
use crate::protocol::RoomId;
use crate::transport::{Connector, Transport};

/// Path of the room channel on the server.
const ROOM_CHANNEL_PATH: &str = "/ws/room";

/// Type alias for the underlying WebSocket stream.
///
/// Made public so that callers can construct a [`WebSocketTransport`] from an
/// existing stream via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] implementation backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any messages,
/// making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Establish a new WebSocket connection to the given `ws://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::Connect`] if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self, RoomClientError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| RoomClientError::Connect(e.to_string()))?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Create a [`WebSocketTransport`] from an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), RoomClientError> {
        if self.closed {
            return Err(RoomClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RoomClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RoomClientError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(RoomClientError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self, reason: &str) -> Result<(), RoomClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: reason.to_owned().into(),
        };
        self.stream
            .close(Some(frame))
            .await
            .map_err(|e| RoomClientError::TransportSend(e.to_string()))
    }
}

/// Opens [`WebSocketTransport`]s to the room channel of a listening room server.
///
/// The channel lives at `/ws/room?id=<room>` on the same host as the HTTP
/// API; `http` bases map to `ws` and `https` bases to `wss`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base: Url,
}

impl WebSocketConnector {
    /// Create a connector for the server behind `base_url` (e.g.
    /// `http://localhost:8080`).
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::InvalidUrl`] if `base_url` does not parse or
    /// uses a scheme other than `http`, `https`, `ws` or `wss`.
    pub fn new(base_url: &str) -> Result<Self, RoomClientError> {
        let mut base = Url::parse(base_url)
            .map_err(|e| RoomClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(RoomClientError::InvalidUrl(format!(
                    "{base_url}: unsupported scheme {other}"
                )))
            }
        };
        base.set_scheme(scheme).map_err(|()| {
            RoomClientError::InvalidUrl(format!("{base_url}: cannot switch to {scheme}"))
        })?;
        base.set_path(ROOM_CHANNEL_PATH);
        base.set_query(None);
        base.set_fragment(None);
        Ok(Self { base })
    }

    /// The channel URL for `room_id`.
    pub fn room_url(&self, room_id: &RoomId) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("id", room_id.as_str());
        url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self, room_id: &RoomId) -> Result<WebSocketTransport, RoomClientError> {
        WebSocketTransport::connect(self.room_url(room_id).as_str()).await
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[test]
    fn room_url_maps_http_to_ws() {
        let connector = WebSocketConnector::new("http://localhost:8080").unwrap();
        let url = connector.room_url(&RoomId::new("r1"));
        assert_eq!(url.as_str(), "ws://localhost:8080/ws/room?id=r1");
    }

    #[test]
    fn room_url_maps_https_to_wss_and_drops_base_path() {
        let connector = WebSocketConnector::new("https://rooms.example.com/app?x=1").unwrap();
        let url = connector.room_url(&RoomId::new("a b"));
        assert_eq!(url.as_str(), "wss://rooms.example.com/ws/room?id=a+b");
    }

    #[test]
    fn connector_rejects_unknown_scheme() {
        let err = WebSocketConnector::new("ftp://example.com").unwrap_err();
        assert!(matches!(err, RoomClientError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url").await.unwrap_err();
        assert!(matches!(err, RoomClientError::Connect(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, RoomClientError::Connect(_)));
    }

    // ── Mock-stream helpers ──────────────────────────────────────────────

    use tokio::net::TcpListener;

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the `http://` base address to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("http://{addr}")
    }

    // ── Mock-stream tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn connector_opens_room_channel_and_receives_text() {
        let base = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("snapshot-1".into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("snapshot-2".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(&base).unwrap();
        let mut transport = connector.connect(&RoomId::new("r1")).await.unwrap();

        assert_eq!(transport.recv().await.unwrap().unwrap(), "snapshot-1");
        // The binary frame is skipped.
        assert_eq!(transport.recv().await.unwrap().unwrap(), "snapshot-2");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_sends_going_away_with_reason() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let base = start_mock_server(|mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Close(frame) = msg {
                    let _ = tx.send(frame);
                    break;
                }
            }
        })
        .await;

        let mut transport = WebSocketConnector::new(&base)
            .unwrap()
            .connect(&RoomId::new("r1"))
            .await
            .unwrap();
        transport.close("reconnect").await.unwrap();

        let frame = rx.await.unwrap().unwrap();
        assert_eq!(frame.code, CloseCode::Away);
        assert_eq!(frame.reason.as_str(), "reconnect");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let base = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketConnector::new(&base)
            .unwrap()
            .connect(&RoomId::new("r1"))
            .await
            .unwrap();
        transport.close("done").await.unwrap();

        let err = transport.send("oops".to_string()).await.unwrap_err();
        assert!(matches!(err, RoomClientError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let base = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketConnector::new(&base)
            .unwrap()
            .connect(&RoomId::new("r1"))
            .await
            .unwrap();
        transport.close("first").await.unwrap();
        transport.close("second").await.unwrap();
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let base = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = tx.send(text.to_string());
            }
        })
        .await;

        let mut transport = WebSocketConnector::new(&base)
            .unwrap()
            .connect(&RoomId::new("r1"))
            .await
            .unwrap();
        transport.send(r#"{"type":"next"}"#.to_string()).await.unwrap();

        assert_eq!(rx.await.unwrap(), r#"{"type":"next"}"#);
    }
}
