use axum::body::Body;
use axum::http::{Request, StatusCode};
use chat_db::{MemoryMessageStore, MessageStore};
use chat_types::{Message, UserId};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use qasynda_chat::routes::HistoryResponse;
use qasynda_chat::{ChatServer, Config};
use std::sync::Arc;
use tower::ServiceExt;

async fn server_with(store: Arc<MemoryMessageStore>) -> ChatServer {
    ChatServer::build(Arc::new(Config::for_tests()), store as Arc<dyn MessageStore>)
        .await
        .unwrap()
}

async fn get(server: &ChatServer, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = server
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

/// Three messages between `a` and `b`, one second apart, plus one unrelated
async fn seeded_store(a: UserId, b: UserId) -> (Arc<MemoryMessageStore>, Vec<Message>) {
    let store = Arc::new(MemoryMessageStore::new());
    let base = Utc::now() - ChronoDuration::minutes(1);

    let mut seeded = Vec::new();
    for (i, (from, to)) in [(a, b), (b, a), (a, b)].into_iter().enumerate() {
        let mut message = Message::new(from, to, format!("m{}", i + 1));
        message.created_at = base + ChronoDuration::seconds(i as i64);
        store.append(&message).await.unwrap();
        seeded.push(message);
    }
    store
        .append(&Message::new(a, UserId::random(), "elsewhere"))
        .await
        .unwrap();

    (store, seeded)
}

fn contents(body: &[u8]) -> Vec<String> {
    let response: HistoryResponse = serde_json::from_slice(body).unwrap();
    response.messages.into_iter().map(|m| m.content).collect()
}

#[tokio::test]
async fn test_history_newest_first_with_pagination() {
    let a = UserId::random();
    let b = UserId::random();
    let (store, _) = seeded_store(a, b).await;
    let server = server_with(store).await;

    let (status, body) = get(&server, &format!("/history?user_id_1={}&user_id_2={}", a, b)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&body), vec!["m3", "m2", "m1"]);

    let (status, body) = get(
        &server,
        &format!("/history?user_id_1={}&user_id_2={}&limit=2", b, a),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents(&body), vec!["m3", "m2"]);

    let (_, body) = get(
        &server,
        &format!("/history?identity_1={}&identity_2={}&limit=2&offset=2", a, b),
    )
    .await;
    assert_eq!(contents(&body), vec!["m1"]);

    let (_, body) = get(
        &server,
        &format!("/history?user_id_1={}&user_id_2={}&offset=10", a, b),
    )
    .await;
    assert!(contents(&body).is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_wire_format() {
    let a = UserId::random();
    let b = UserId::random();
    let (store, seeded) = seeded_store(a, b).await;
    let server = server_with(store).await;

    let (_, body) = get(
        &server,
        &format!("/history?user_id_1={}&user_id_2={}&limit=1", a, b),
    )
    .await;
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let first = &value["messages"][0];
    assert_eq!(first["id"], seeded[2].id.to_string());
    assert_eq!(first["sender_id"], a.to_string());
    assert_eq!(first["receiver_id"], b.to_string());
    assert_eq!(first["content"], "m3");
    assert!(first["created_at"].is_string());

    server.shutdown().await;
}

#[tokio::test]
async fn test_history_rejects_bad_parameters() {
    let server = server_with(Arc::new(MemoryMessageStore::new())).await;
    let a = UserId::random();

    let (status, _) = get(&server, &format!("/history?user_id_1={}", a)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(&server, &format!("/history?user_id_1={}&user_id_2=bob", a)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(
        &server,
        &format!("/history?user_id_1={}&user_id_2={}&limit=lots", a, UserId::random()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    server.shutdown().await;
}

#[tokio::test]
async fn test_ws_identity_checked_before_upgrade() {
    let server = server_with(Arc::new(MemoryMessageStore::new())).await;

    let (status, _) = get(&server, "/ws").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&server, "/ws?user_id=").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&server, "/ws?user_id=alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Well-formed identity, but not a WebSocket handshake
    let (status, _) = get(&server, &format!("/ws?user_id={}", UserId::random())).await;
    assert!(status.is_client_error());

    server.shutdown().await;
}

#[tokio::test]
async fn test_health_and_metrics() {
    let server = server_with(Arc::new(MemoryMessageStore::new())).await;

    let (status, body) = get(&server, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, _) = get(&server, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    server.shutdown().await;
}
