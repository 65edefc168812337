//! Error types for the listening room client.

use thiserror::Error;

/// Errors that can occur when using the listening room client.
#[derive(Debug, Error)]
pub enum RoomClientError {
    /// The real-time connection could not be established (or did not
    /// establish within the configured connect timeout).
    #[error("connect error: {0}")]
    Connect(String),

    /// The initial room snapshot did not arrive within the handshake timeout.
    #[error("operation timed out")]
    Timeout,

    /// The first message after connecting was missing or was not a valid
    /// room snapshot.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// `join` was interrupted by [`close`](crate::RoomSession::close) or a
    /// newer `join` before the room connection was established.
    #[error("join cancelled: {0}")]
    Cancelled(String),

    /// The transport connection is closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires a live connection, but the
    /// session has none.
    #[error("not connected to a room")]
    NotConnected,

    /// A room operation needs the room state, but no snapshot has been
    /// received yet.
    #[error("room state not received yet")]
    NoRoomState,

    /// The REST API answered with a non-success status.
    #[error("request failed with status {status}: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body text, as returned by the server.
        body: String,
    },

    /// The HTTP request could not be performed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL cannot be turned into an endpoint.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized [`Result`] type for listening room client operations.
pub type Result<T> = std::result::Result<T, RoomClientError>;
