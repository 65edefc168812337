//! REST collaborators of the room server.
//!
//! Every call here is a single request/response exchange with no state of its
//! own. Any answer other than `200 OK` becomes
//! [`RoomClientError::Request`] carrying the status and the body text.

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, RoomClientError};
use crate::protocol::{CreatedRoom, RoomId, VideoItem};

const ROOMS_PATH: &str = "/api/v1/rooms";
const VIDEOS_PATH: &str = "/api/v1/videos";
const QUEUE_PATH: &str = "/api/v1/rooms/queue";
const DELETE_PATH: &str = "/api/v1/rooms/delete";
const SEEK_PATH: &str = "/api/v1/rooms/seek";

/// HTTP client for room creation, catalog search and queue/seek edits.
#[derive(Debug, Clone)]
pub struct RoomApi {
    http: Client,
    base_url: String,
}

impl RoomApi {
    /// Build an API client for `config.base_url`, applying
    /// `config.request_timeout` to every call.
    ///
    /// # Errors
    ///
    /// Returns [`RoomClientError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self::with_client(http, &config.base_url))
    }

    /// Use an existing `reqwest` client (shared pools, custom TLS, ...).
    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a new room and return its identifier.
    pub async fn create_room(&self) -> Result<RoomId> {
        let response = self.http.post(self.url(ROOMS_PATH)).send().await?;
        let created: CreatedRoom = expect_ok(response).await?.json().await?;
        debug!(room = %created.id, "room created");
        Ok(created.id)
    }

    /// Search the video catalog by name.
    pub async fn search_videos(&self, query: &str) -> Result<Vec<VideoItem>> {
        let response = self
            .http
            .get(self.url(VIDEOS_PATH))
            .query(&[("name", query)])
            .send()
            .await?;
        // The server encodes an empty result as `null`.
        let videos: Option<Vec<VideoItem>> = expect_ok(response).await?.json().await?;
        Ok(videos.unwrap_or_default())
    }

    /// Append `video` to the room's queue.
    pub async fn enqueue(&self, room_id: &RoomId, video: &VideoItem) -> Result<()> {
        let response = self
            .http
            .post(self.url(QUEUE_PATH))
            .query(&[("id", room_id.as_str())])
            .json(video)
            .send()
            .await?;
        expect_ok(response).await?;
        debug!(room = %room_id, title = %video.title, "video queued");
        Ok(())
    }

    /// Remove the queue entry at `index`.
    pub async fn remove_from_queue(&self, room_id: &RoomId, index: usize) -> Result<()> {
        let index = index.to_string();
        let response = self
            .http
            .delete(self.url(DELETE_PATH))
            .query(&[("id", room_id.as_str()), ("idx", index.as_str())])
            .send()
            .await?;
        expect_ok(response).await?;
        debug!(room = %room_id, %index, "queue entry removed");
        Ok(())
    }

    /// Move playback of the current item to `position` seconds.
    ///
    /// The position is sent with two decimal places.
    pub async fn seek(&self, room_id: &RoomId, position: f64) -> Result<()> {
        let position = format!("{position:.2}");
        let response = self
            .http
            .post(self.url(SEEK_PATH))
            .query(&[("id", room_id.as_str()), ("pos", position.as_str())])
            .send()
            .await?;
        expect_ok(response).await?;
        debug!(room = %room_id, %position, "seek requested");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

async fn expect_ok(response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    warn!(%status, %url, %body, "room API request failed");
    Err(RoomClientError::Request {
        status: status.as_u16(),
        body,
    })
}
