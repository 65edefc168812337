//! Wire-compatible protocol types for the listening room service.
//!
//! Every type in this module produces the same JSON the room server reads and
//! writes. Key adaptations:
//!
//! - Room identifiers are opaque strings (the server issues UUIDs, the client
//!   never interprets them)
//! - `updated_at` timestamps stay as the server's RFC 3339 `String`
//! - A `null` queue (the server's encoding of an empty list) decodes as empty

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ── Identifiers ─────────────────────────────────────────────────────

/// Opaque identifier of a room, issued by the server on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a server-issued room token.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw token, as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ── Catalog ─────────────────────────────────────────────────────────

/// A playable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    /// Location the player loads the media from.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Length in whole seconds.
    #[serde(rename = "duration")]
    pub duration_seconds: u64,
}

impl VideoItem {
    /// Create a new catalog entry.
    pub fn new(url: impl Into<String>, title: impl Into<String>, duration_seconds: u64) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            duration_seconds,
        }
    }
}

// ── Room state ──────────────────────────────────────────────────────

/// Full authoritative state of a room at one revision.
///
/// Snapshots are pushed by the server and replace the previously cached one
/// wholesale. The client never edits one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room this snapshot belongs to.
    #[serde(rename = "id")]
    pub room_id: RoomId,
    /// Item currently loaded, if any.
    pub current: Option<VideoItem>,
    /// Upcoming items in server order.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub queue: Vec<VideoItem>,
    /// Playback flag. Only meaningful while `current` is set.
    pub playing: bool,
    /// Position within `current`, in seconds.
    #[serde(rename = "position")]
    pub position_seconds: f64,
    /// When the server computed this snapshot (RFC 3339).
    #[serde(default)]
    pub updated_at: String,
}

impl RoomSnapshot {
    /// Whether something is actually playing: the flag is set *and* an item
    /// is loaded.
    pub fn is_playing(&self) -> bool {
        self.playing && self.current.is_some()
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Response body of room creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRoom {
    /// Identifier of the new room.
    pub id: RoomId,
}

// ── Commands ────────────────────────────────────────────────────────

/// Playback-control instruction sent over the room connection.
///
/// Fire-and-forget: the effect shows up in a later [`RoomSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    /// Resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Skip to the next queued item.
    Next,
}

#[cfg(test)]
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
    fn null_queue_decodes_as_empty() {
        let json = r#"{"id":"r1","current":null,"queue":null,"playing":false,"position":0,"updated_at":"2025-01-01T00:00:00Z"}"#;
        let snapshot: RoomSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.current.is_none());
    }

    #[test]
    fn is_playing_requires_current_item() {
        let json = r#"{"id":"r1","current":null,"queue":[],"playing":true,"position":3.5}"#;
        let snapshot: RoomSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.playing);
        assert!(!snapshot.is_playing());
    }

    #[test]
    fn command_serializes_with_type_tag() {
        assert_eq!(
            serde_json::to_string(&Command::Pause).unwrap(),
            r#"{"type":"pause"}"#
        );
    }

    #[test]
    fn room_id_is_transparent() {
        let id = RoomId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
        assert_eq!(id.to_string(), "abc");
    }
}
