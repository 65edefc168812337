//! Notifications published by a [`RoomSession`](crate::RoomSession).

use std::fmt;
use std::sync::Arc;

use crate::protocol::RoomSnapshot;

/// Why a room connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed by this client (`"reconnect"`, `"client closed"`, ...).
    Local(String),
    /// The server closed the connection cleanly.
    Remote,
    /// Reading from the connection failed.
    Transport(String),
    /// The server sent something that is not a room snapshot.
    Decode(String),
    /// The connection could not be opened.
    Connect(String),
    /// The connection opened but the initial snapshot never arrived intact.
    Handshake(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(reason) => write!(f, "closed locally: {reason}"),
            Self::Remote => f.write_str("closed by server"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Decode(e) => write!(f, "malformed room snapshot: {e}"),
            Self::Connect(e) => write!(f, "connect failed: {e}"),
            Self::Handshake(e) => write!(f, "handshake failed: {e}"),
        }
    }
}

/// Events delivered to the application, in the order the server sent them.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The cached room state was replaced by this snapshot.
    RoomState(Arc<RoomSnapshot>),
    /// The connection ended; no more `RoomState` events follow for it.
    SessionClosed {
        /// Why the connection ended.
        reason: CloseReason,
    },
}

impl RoomEvent {
    /// Event name used when forwarding to a host application
    /// (`"room_state"` / `"session_closed"`).
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomState(_) => "room_state",
            Self::SessionClosed { .. } => "session_closed",
        }
    }
}
