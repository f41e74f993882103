//! Integration tests for the WebSocket channel: ping/pong, live delivery,
//! read receipts, typing relay and multi-device fanout.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use hubchat_server::chat::service::MessageService;
use hubchat_server::chat::store::{MessageStore, RetryPolicy};
use hubchat_server::db::SqliteRepository;
use hubchat_server::friends::FriendDirectory;
use hubchat_server::ws::actor::Heartbeat;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: start the server on a random port with alice<->bob linked.
/// Returns (base_url, addr, data_dir handle).
async fn start_test_server() -> (String, SocketAddr, tempfile::TempDir) {
    start_test_server_with(Heartbeat::default()).await
}

async fn start_test_server_with(heartbeat: Heartbeat) -> (String, SocketAddr, tempfile::TempDir) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let repo = SqliteRepository::open(&data_dir).expect("Failed to init DB");
    let store = Arc::new(
        MessageStore::open(Arc::new(repo), RetryPolicy::default()).expect("Failed to open store"),
    );
    let friends = FriendDirectory::new();
    friends.link("alice", "bob");

    let connections = hubchat_server::ws::ConnectionRegistry::new();
    let state = hubchat_server::state::AppState {
        messages: Arc::new(MessageService::new(
            store,
            Arc::new(friends),
            connections.clone(),
        )),
        connections,
        heartbeat,
    };

    let app = hubchat_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{}", addr), addr, tmp_dir)
}

/// Open a WebSocket for `user_id` and wait until the server reports the
/// expected number of live connections for that user.
async fn connect(addr: SocketAddr, base_url: &str, user_id: &str, expected: u64) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/{}", addr, user_id))
        .await
        .expect("WebSocket connect failed");

    let client = reqwest::Client::new();
    for _ in 0..50 {
        let presence: Value = client
            .get(format!("{}/api/users/{}/presence", base_url, user_id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if presence["connections"].as_u64() == Some(expected) {
            return ws;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("connection for {} never registered", user_id);
}

/// Read frames until a JSON text frame arrives, or time out.
async fn next_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("Event is not JSON");
        }
    }
}

async fn send_text(base_url: &str, from: &str, to: &str, text: &str) -> Value {
    reqwest::Client::new()
        .post(format!("{}/api/messages", base_url))
        .json(&json!({
            "fromUserId": from,
            "toUserId": to,
            "content": text,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ping_pong_frame() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut ws = connect(addr, &base_url, "alice", 1).await;

    ws.send(Message::Text(json!({"type": "ping"}).to_string().into()))
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "pong");
}

#[tokio::test]
async fn test_invalid_frame_returns_error() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut ws = connect(addr, &base_url, "alice", 1).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], 400);
}

#[tokio::test]
async fn test_online_recipient_gets_message_and_it_is_delivered() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut bob = connect(addr, &base_url, "bob", 1).await;

    let sent = send_text(&base_url, "alice", "bob", "hello bob").await;
    assert_eq!(sent["status"], "delivered");

    let event = next_event(&mut bob).await;
    assert_eq!(event["type"], "new_message");
    assert_eq!(event["message"]["content"], "hello bob");
    assert_eq!(event["message"]["fromUserId"], "alice");
    assert_eq!(event["message"]["id"], sent["id"]);
}

#[tokio::test]
async fn test_sender_receives_read_receipts() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut alice = connect(addr, &base_url, "alice", 1).await;

    let sent = send_text(&base_url, "alice", "bob", "read me").await;
    let id = sent["id"].as_str().unwrap().to_string();

    let client = reqwest::Client::new();
    client
        .put(format!("{}/api/messages/{}/read", base_url, id))
        .send()
        .await
        .unwrap();

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "message_read");
    assert_eq!(event["messageId"], id);
    assert!(event["readAt"].is_string());

    send_text(&base_url, "alice", "bob", "second").await;
    send_text(&base_url, "alice", "bob", "third").await;
    client
        .put(format!("{}/api/conversations/bob/alice/read", base_url))
        .send()
        .await
        .unwrap();

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "messages_read");
    assert_eq!(event["userId"], "bob");
    assert_eq!(event["count"], 2);
}

#[tokio::test]
async fn test_typing_is_relayed() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut alice = connect(addr, &base_url, "alice", 1).await;
    let mut bob = connect(addr, &base_url, "bob", 1).await;

    alice
        .send(Message::Text(
            json!({"type": "typing", "recipientId": "bob", "isTyping": true})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let event = next_event(&mut bob).await;
    assert_eq!(event["type"], "typing");
    assert_eq!(event["userId"], "alice");
    assert_eq!(event["isTyping"], true);
}

#[tokio::test]
async fn test_mark_delivered_frame() {
    let (base_url, addr, _tmp) = start_test_server().await;

    // Sent while bob is offline, so it stays `sent`.
    let sent = send_text(&base_url, "alice", "bob", "queued").await;
    assert_eq!(sent["status"], "sent");
    let id = sent["id"].as_str().unwrap().to_string();

    let mut bob = connect(addr, &base_url, "bob", 1).await;
    bob.send(Message::Text(
        json!({"type": "mark_delivered", "messageId": id})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    let client = reqwest::Client::new();
    let mut status = String::new();
    for _ in 0..50 {
        let convo: Vec<Value> = client
            .get(format!("{}/api/conversations/alice/bob", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        status = convo[0]["status"].as_str().unwrap().to_string();
        if status == "delivered" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, "delivered");
}

#[tokio::test]
async fn test_every_device_receives_message() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut phone = connect(addr, &base_url, "bob", 1).await;
    let mut laptop = connect(addr, &base_url, "bob", 2).await;

    let sent = send_text(&base_url, "alice", "bob", "both of you").await;
    assert_eq!(sent["status"], "delivered");

    for device in [&mut phone, &mut laptop] {
        let event = next_event(device).await;
        assert_eq!(event["type"], "new_message");
        assert_eq!(event["message"]["content"], "both of you");
    }
}

#[tokio::test]
async fn test_disconnect_goes_offline() {
    let (base_url, addr, _tmp) = start_test_server().await;
    let mut bob = connect(addr, &base_url, "bob", 1).await;
    bob.close(None).await.unwrap();

    let client = reqwest::Client::new();
    let mut online = true;
    for _ in 0..50 {
        let presence: Value = client
            .get(format!("{}/api/users/bob/presence", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        online = presence["online"].as_bool().unwrap();
        if !online {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!online);

    let sent = send_text(&base_url, "alice", "bob", "after close").await;
    assert_eq!(sent["status"], "sent");
}

#[tokio::test]
async fn test_mark_delivered_by_sender_is_refused() {
    let (base_url, addr, _tmp) = start_test_server().await;

    let sent = send_text(&base_url, "alice", "bob", "not yours to ack").await;
    let id = sent["id"].as_str().unwrap().to_string();

    let mut alice = connect(addr, &base_url, "alice", 1).await;
    alice
        .send(Message::Text(
            json!({"type": "mark_delivered", "messageId": id})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();

    let event = next_event(&mut alice).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["code"], 404);

    let convo: Vec<Value> = reqwest::Client::new()
        .get(format!("{}/api/conversations/alice/bob", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(convo[0]["status"], "sent");
}

#[tokio::test]
async fn test_unresponsive_peer_is_dropped() {
    let (base_url, addr, _tmp) = start_test_server_with(Heartbeat {
        ping_interval: Duration::from_millis(100),
        pong_timeout: Duration::from_millis(200),
    })
    .await;

    // Never polled again, so the client never answers pings.
    let _silent = connect(addr, &base_url, "bob", 1).await;

    let client = reqwest::Client::new();
    let mut online = true;
    for _ in 0..100 {
        let presence: Value = client
            .get(format!("{}/api/users/bob/presence", base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        online = presence["online"].as_bool().unwrap();
        if !online {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!online);

    let sent = send_text(&base_url, "alice", "bob", "anyone there?").await;
    assert_eq!(sent["status"], "sent");
}
