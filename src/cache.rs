//! Last known room state, shared between the session handle and its
//! receive loop.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::RoomSnapshot;

/// Holds the most recent [`RoomSnapshot`] received from the server.
///
/// The receive loop is the only writer. Each [`set`](SnapshotCache::set)
/// swaps the whole `Arc`, so a reader sees either the previous snapshot or
/// the new one, never a mix of both. The lock is held only for the pointer
/// swap or clone.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    current: RwLock<Option<Arc<RoomSnapshot>>>,
}

impl SnapshotCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached snapshot, if one has been received.
    pub fn get(&self) -> Option<Arc<RoomSnapshot>> {
        self.current.read().clone()
    }

    /// Replace the cached snapshot.
    pub(crate) fn set(&self, snapshot: Arc<RoomSnapshot>) {
        *self.current.write() = Some(snapshot);
    }
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
    use crate::protocol::{RoomId, VideoItem};

    fn snapshot(position: f64, current: Option<VideoItem>) -> Arc<RoomSnapshot> {
        Arc::new(RoomSnapshot {
            room_id: RoomId::new("r1"),
            current,
            queue: vec![],
            playing: true,
            position_seconds: position,
            updated_at: String::new(),
        })
    }

    #[test]
    fn empty_until_first_set() {
        let cache = SnapshotCache::new();
        assert!(cache.get().is_none());
    }

    #[test]
    fn set_replaces_instead_of_merging() {
        let cache = SnapshotCache::new();
        cache.set(snapshot(1.0, Some(VideoItem::new("u", "t", 10))));
        cache.set(snapshot(2.0, None));

        let got = cache.get().unwrap();
        assert_eq!(got.position_seconds, 2.0);
        assert!(got.current.is_none());
    }

    #[test]
    fn concurrent_readers_see_whole_snapshots() {
        let cache = Arc::new(SnapshotCache::new());
        cache.set(snapshot(0.0, None));

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 1..=500u32 {
                    let position = f64::from(i);
                    let item = VideoItem::new(format!("u{i}"), format!("t{i}"), i.into());
                    cache.set(snapshot(position, Some(item)));
                }
            })
        };

        for _ in 0..500 {
            let seen = cache.get().unwrap();
            if let Some(item) = &seen.current {
                assert_eq!(item.url, format!("u{}", seen.position_seconds));
            }
        }
        writer.join().unwrap();
        assert_eq!(cache.get().unwrap().position_seconds, 500.0);
    }
}
