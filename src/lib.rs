//! # Listening Room Client
//!
//! Async client for shared listening rooms: a server keeps the authoritative
//! playback state of a room (current video, queue, play flag, position) and
//! pushes a full snapshot to every participant whenever it changes.
//!
//! This crate provides:
//!
//! - [`RoomSession`]: joins a room over a real-time connection, caches the
//!   latest [`RoomSnapshot`], publishes [`RoomEvent`]s and sends playback
//!   commands (play/pause/next)
//! - [`RoomApi`]: the one-shot REST calls (create room, catalog search,
//!   queue edits, seek)
//! - [`Transport`] / [`Connector`]: the seam for plugging in any message
//!   transport; the default `transport-websocket` feature provides
//!   [`WebSocketConnector`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), listening_room_client::RoomClientError> {
//! use listening_room_client::{ClientConfig, RoomEvent, RoomSession};
//!
//! let (session, mut events) = RoomSession::websocket(ClientConfig::from_env())?;
//! let room = session.api().create_room().await?;
//! let snapshot = session.join(room).await?;
//! println!("queue has {} items", snapshot.queue.len());
//!
//! while let Some(event) = events.recv().await {
//!     if let RoomEvent::SessionClosed { reason } = event {
//!         println!("session closed: {reason}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and never installs a subscriber.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::RoomApi;
pub use cache::SnapshotCache;
pub use config::ClientConfig;
pub use error::RoomClientError;
pub use event::{CloseReason, RoomEvent};
pub use protocol::{Command, RoomId, RoomSnapshot, VideoItem};
pub use session::{RoomSession, SessionState};
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
