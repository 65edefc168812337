//! Transport abstraction for room connections.
//!
//! The [`Transport`] trait defines a bidirectional text message channel between
//! the client and the room server. Room snapshots and commands are JSON text
//! messages, so every transport implementation must handle message framing
//! internally (WebSocket frames, length-prefixed TCP, ...).
//!
//! Opening a transport is the job of a [`Connector`]: the session asks it for
//! a fresh connection every time [`RoomSession::join`](crate::RoomSession::join)
//! runs, so one connector serves any number of joins and reconnects.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use listening_room_client::error::RoomClientError;
//! use listening_room_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), RoomClientError> {
//!         // Send the JSON text message over your transport
//!         # let _ = message;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RoomClientError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         None
//!     }
//!
//!     async fn close(&mut self, reason: &str) -> Result<(), RoomClientError> {
//!         // Gracefully shut down the connection
//!         # let _ = reason;
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RoomClientError;
use crate::protocol::RoomId;

/// A bidirectional text message transport bound to one room.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
/// The transport never coalesces or splits messages.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because the
/// session's receive loop uses it inside `tokio::select!`. If `recv` is
/// cancelled before completion, calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::TransportClosed`] after [`close`](Transport::close),
    /// or [`RoomClientError::TransportSend`] if the write fails.
    async fn send(&mut self, message: String) -> Result<(), RoomClientError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete message was received
    /// - `Some(Err(e))`: a transport error occurred
    /// - `None`: the connection was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, RoomClientError>>;

    /// Close the connection, telling the peer why.
    ///
    /// Idempotent: closing an already closed transport returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self, reason: &str) -> Result<(), RoomClientError>;
}

/// Opens room-scoped transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Open a connection to `room_id`'s real-time channel.
    ///
    /// The session bounds this call with its connect timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::Connect`] (or [`RoomClientError::InvalidUrl`])
    /// when no connection can be established.
    async fn connect(&self, room_id: &RoomId) -> Result<Self::Transport, RoomClientError>;
}
