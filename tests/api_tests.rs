#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! REST collaborator tests.
//!
//! `RoomApi` calls go to a local HTTP server that records every request and
//! answers with scripted responses. The session-level room operations
//! (enqueue, remove, seek) are checked against the same server plus a mock
//! room connection.

mod common;

use listening_room_client::{Command, RoomApi, RoomClientError, RoomId, VideoItem};

use common::{
    idle_snapshot, mock_connection, snapshot, start_http_server, start_session,
    start_session_with_api, test_config, video, ConnectOutcome,
};

fn api(base_url: &str) -> RoomApi {
    RoomApi::new(&test_config(base_url)).unwrap()
}

// ════════════════════════════════════════════════════════════════════
// RoomApi
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn create_room_returns_server_id() {
    let (base, requests) =
        start_http_server(vec![(200, r#"{"id":"3fa85f64-5717-4562-b3fc-2c963f66afa6"}"#)]).await;

    let id = api(&base).create_room().await.unwrap();

    assert_eq!(id, RoomId::new("3fa85f64-5717-4562-b3fc-2c963f66afa6"));
    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/v1/rooms");
}

#[tokio::test]
async fn search_videos_encodes_query() {
    let body = r#"[{"url":"https://videos.example/1","title":"Lo Fi","duration":181}]"#;
    let (base, requests) = start_http_server(vec![(200, body)]).await;

    let videos = api(&base).search_videos("lo fi").await.unwrap();

    assert_eq!(
        videos,
        vec![VideoItem::new("https://videos.example/1", "Lo Fi", 181)]
    );
    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].target, "/api/v1/videos?name=lo+fi");
}

#[tokio::test]
async fn search_videos_treats_null_as_empty() {
    let (base, _requests) = start_http_server(vec![(200, "null")]).await;
    assert!(api(&base).search_videos("nothing").await.unwrap().is_empty());
}

#[tokio::test]
async fn enqueue_posts_video_as_json() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;

    api(&base)
        .enqueue(&RoomId::new("r1"), &video(3))
        .await
        .unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/v1/rooms/queue?id=r1");
    let sent: VideoItem = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(sent, video(3));
    assert!(requests[0].body.contains(r#""duration":183"#));
}

#[tokio::test]
async fn remove_from_queue_sends_delete_with_index() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;

    api(&base)
        .remove_from_queue(&RoomId::new("r1"), 2)
        .await
        .unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[0].target, "/api/v1/rooms/delete?id=r1&idx=2");
}

#[tokio::test]
async fn seek_formats_position_with_two_decimals() {
    let (base, requests) = start_http_server(vec![(200, ""), (200, "")]).await;
    let api = api(&base);

    api.seek(&RoomId::new("r1"), 12.5).await.unwrap();
    api.seek(&RoomId::new("r1"), 7.0).await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].target, "/api/v1/rooms/seek?id=r1&pos=12.50");
    assert_eq!(requests[1].target, "/api/v1/rooms/seek?id=r1&pos=7.00");
}

#[tokio::test]
async fn non_ok_status_carries_status_and_body() {
    let (base, _requests) = start_http_server(vec![(404, "room not found")]).await;

    let err = api(&base)
        .remove_from_queue(&RoomId::new("gone"), 0)
        .await
        .unwrap_err();

    match err {
        RoomClientError::Request { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "room not found");
        }
        other => panic!("expected Request error, got {other:?}"),
    }
}

#[tokio::test]
async fn base_url_trailing_slash_is_ignored() {
    let (base, requests) = start_http_server(vec![(200, r#"{"id":"r9"}"#)]).await;

    let id = api(&format!("{base}/")).create_room().await.unwrap();

    assert_eq!(id, RoomId::new("r9"));
    assert_eq!(requests.lock().unwrap()[0].target, "/api/v1/rooms");
}

// ════════════════════════════════════════════════════════════════════
// Session room operations
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn room_operations_need_a_snapshot() {
    let (session, _events, _rooms) = start_session(vec![]);

    assert!(matches!(
        session.enqueue(&video(1)).await,
        Err(RoomClientError::NoRoomState)
    ));
    assert!(matches!(
        session.remove_from_queue(0).await,
        Err(RoomClientError::NoRoomState)
    ));
    assert!(matches!(
        session.seek(10.0).await,
        Err(RoomClientError::NoRoomState)
    ));
}

#[tokio::test]
async fn seek_without_current_item_is_a_no_op() {
    let (base, requests) = start_http_server(vec![]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&idle_snapshot("r1"));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("r1").await.unwrap();

    session.seek(42.0).await.unwrap();

    assert!(requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn seek_uses_cached_room() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&snapshot("room-7", Some(video(1)), true, 5.0));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("room-7").await.unwrap();

    session.seek(61.257).await.unwrap();

    assert_eq!(
        requests.lock().unwrap()[0].target,
        "/api/v1/rooms/seek?id=room-7&pos=61.26"
    );
}

#[tokio::test]
async fn enqueue_into_idle_room_starts_playback() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&idle_snapshot("r1"));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("r1").await.unwrap();

    session.enqueue(&video(4)).await.unwrap();

    assert_eq!(
        requests.lock().unwrap()[0].target,
        "/api/v1/rooms/queue?id=r1"
    );
    assert_eq!(server.commands(), vec![Command::Next]);
}

#[tokio::test]
async fn enqueue_while_playing_only_queues() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&snapshot("r1", Some(video(1)), true, 30.0));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("r1").await.unwrap();

    session.enqueue(&video(2)).await.unwrap();

    assert_eq!(requests.lock().unwrap().len(), 1);
    assert!(server.sent_raw().is_empty());
}

#[tokio::test]
async fn enqueue_failure_skips_next() {
    let (base, _requests) = start_http_server(vec![(500, "queue full")]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&idle_snapshot("r1"));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("r1").await.unwrap();

    let err = session.enqueue(&video(2)).await.unwrap_err();

    assert!(matches!(err, RoomClientError::Request { status: 500, .. }));
    assert!(server.sent_raw().is_empty());
}

#[tokio::test]
async fn remove_from_queue_uses_cached_room() {
    let (base, requests) = start_http_server(vec![(200, "")]).await;
    let (transport, server) = mock_connection();
    server.push_snapshot(&idle_snapshot("r1"));
    let (session, _events, _rooms) =
        start_session_with_api(vec![ConnectOutcome::Accept(transport)], &base);
    session.join("r1").await.unwrap();

    session.remove_from_queue(1).await.unwrap();

    let requests = requests.lock().unwrap();
    assert_eq!(requests[0].method, "DELETE");
    assert_eq!(requests[0].target, "/api/v1/rooms/delete?id=r1&idx=1");
}
