//! # Room Listener
//!
//! Joins a listening room and prints every state change:
//!
//! 1. Create a room over the REST API, or join the one given on the command line
//! 2. Receive the initial snapshot
//! 3. Print each `room_state` event as the server pushes it
//! 4. Shut down on Ctrl+C or when the server closes the room
//!
//! ## Running
//!
//! ```sh
//! # Start a room server on localhost:8080, then:
//! cargo run --example room_listener
//!
//! # Join an existing room on another server:
//! ROOM_API_BASE_URL=http://my-server:8080 cargo run --example room_listener -- <room-id>
//! ```

use listening_room_client::{ClientConfig, RoomEvent, RoomSession, RoomSnapshot};

fn describe(snapshot: &RoomSnapshot) -> String {
    let current = snapshot
        .current
        .as_ref()
        .map_or("nothing", |video| video.title.as_str());
    let status = if snapshot.is_playing() {
        "playing"
    } else {
        "paused"
    };
    format!(
        "{status} {current} at {:.1}s, {} queued",
        snapshot.position_seconds,
        snapshot.queue.len()
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env();
    tracing::info!("Using room server at {}", config.base_url);

    let (session, mut event_rx) = RoomSession::websocket(config)?;

    // ── Join ────────────────────────────────────────────────────────
    let room_id = match std::env::args().nth(1) {
        Some(id) => id.into(),
        None => {
            let id = session.api().create_room().await?;
            tracing::info!("Created room {id}");
            id
        }
    };

    let initial = session.join(room_id.clone()).await?;
    tracing::info!("Joined room {room_id}: {}", describe(&initial));

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    RoomEvent::RoomState(snapshot) => {
                        tracing::info!("{}", describe(&snapshot));
                    }
                    RoomEvent::SessionClosed { reason } => {
                        tracing::warn!("Session closed: {reason}");
                        break;
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    session.close().await?;
    tracing::info!("Left room {room_id}");
    Ok(())
}
