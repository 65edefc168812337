//! Client configuration.

use std::time::Duration;

/// Environment variable read by [`ClientConfig::from_env`].
pub const BASE_URL_ENV: &str = "ROOM_API_BASE_URL";

/// Base URL used when [`BASE_URL_ENV`] is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default bound on opening the room connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on receiving the first room snapshot.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for a graceful connection shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for REST calls.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration shared by [`RoomSession`](crate::RoomSession) and
/// [`RoomApi`](crate::RoomApi).
///
/// # Example
///
/// ```
/// use listening_room_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("http://localhost:8080")
///     .with_handshake_timeout(Duration::from_secs(3))
///     .with_event_channel_capacity(64);
/// assert_eq!(config.connect_timeout, Duration::from_secs(5));
/// assert_eq!(config.event_channel_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the room server, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Bound on opening the room connection. Defaults to **5 seconds**.
    pub connect_timeout: Duration,
    /// Bound on receiving the first snapshot after connecting.
    /// Defaults to **10 seconds**.
    pub handshake_timeout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// The receive loop waits for room when the channel is full; snapshots are
    /// never dropped. Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long a closing connection gets to finish its close handshake
    /// before its loop task is aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Timeout applied to each REST call. Defaults to **10 seconds**.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration for the server at `base_url` with default values.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read the base URL from `ROOM_API_BASE_URL`, falling back to
    /// `http://localhost:8080` when it is unset or empty.
    pub fn from_env() -> Self {
        let base_url = std::env::var(BASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts the loop right away.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the REST request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
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

    #[test]
    fn defaults() {
        let config = ClientConfig::new("http://example.com");
        assert_eq!(config.base_url, "http://example.com");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn event_channel_capacity_is_clamped() {
        let config = ClientConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[test]
    fn default_points_at_localhost() {
        assert_eq!(ClientConfig::default().base_url, DEFAULT_BASE_URL);
    }
}
