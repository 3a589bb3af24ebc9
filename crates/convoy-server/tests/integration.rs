//! End-to-end tests over real HTTP and WebSocket clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use convoy_core::{ConvoyId, VerificationToken};
use convoy_server::metrics::detached_handle;
use convoy_server::notifier::LogNotifier;
use convoy_server::{ConvoyServer, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a server on an ephemeral port.
async fn boot_server() -> (SocketAddr, Arc<ConvoyServer>) {
    let server = Arc::new(ConvoyServer::new(
        ServerConfig::default(),
        Arc::new(LogNotifier::new("http://localhost")),
        detached_handle(),
    ));
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn create_convoy(client: &reqwest::Client, addr: SocketAddr) -> String {
    let resp = client
        .post(format!("http://{addr}/convoys"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_owned()
}

async fn join(client: &reqwest::Client, addr: SocketAddr, convoy_id: &str, name: &str) -> u64 {
    let resp = client
        .post(format!("http://{addr}/convoys/{convoy_id}/members"))
        .json(&json!({"name": name, "location": {"lat": 14.6, "lng": 121.0}}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_u64().unwrap()
}

async fn open_channel(addr: SocketAddr, convoy_id: &str, member_id: Option<u64>) -> WsStream {
    let url = match member_id {
        Some(m) => format!("ws://{addr}/ws/convoys/{convoy_id}?memberId={m}"),
        None => format!("ws://{addr}/ws/convoys/{convoy_id}"),
    };
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Next JSON text frame, skipping control frames.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Skip frames until a snapshot satisfies `pred`.
async fn snapshot_where(ws: &mut WsStream, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["type"] == "convoy.snapshot" && pred(&frame["data"]) {
            return frame["data"].clone();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

// ── Channel lifecycle ──

#[tokio::test]
async fn member_channel_handshake_then_snapshot() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let member_id = join(&client, addr, &convoy_id, "Alice").await;

    let mut ws = open_channel(addr, &convoy_id, Some(member_id)).await;
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connection.established");
    assert_eq!(hello["data"]["convoyId"], convoy_id.as_str());
    assert_eq!(hello["data"]["memberId"], member_id);
    assert!(hello["data"]["connectionId"].is_string());

    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "convoy.snapshot");
    assert_eq!(snapshot["data"]["members"][0]["status"], "connected");
    assert_eq!(snapshot["data"]["health"], "healthy");
}

#[tokio::test]
async fn location_over_channel_is_broadcast() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let member_id = join(&client, addr, &convoy_id, "Alice").await;

    let mut member = open_channel(addr, &convoy_id, Some(member_id)).await;
    let _ = snapshot_where(&mut member, |_| true).await;
    let mut observer = open_channel(addr, &convoy_id, None).await;
    let hello = next_json(&mut observer).await;
    assert!(hello["data"]["memberId"].is_null());

    send_json(&mut member, json!({"type": "location.update", "lat": 15.0, "lng": 120.5})).await;
    let seen = snapshot_where(&mut observer, |d| d["members"][0]["location"]["lat"] == 15.0).await;
    assert_eq!(seen["members"][0]["location"]["lng"], 120.5);
}

#[tokio::test]
async fn rest_write_reaches_open_channels() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let mut observer = open_channel(addr, &convoy_id, None).await;
    let _ = snapshot_where(&mut observer, |_| true).await;

    let resp = client
        .post(format!("http://{addr}/convoys/{convoy_id}/destination"))
        .json(&json!({"name": "Tagaytay, Cavite", "lat": 14.1, "lng": 120.9}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let seen = snapshot_where(&mut observer, |d| !d["destination"].is_null()).await;
    assert_eq!(seen["destination"]["name"], "Tagaytay");
}

#[tokio::test]
async fn closing_last_channel_marks_member_disconnected() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let member_id = join(&client, addr, &convoy_id, "Alice").await;

    let mut observer = open_channel(addr, &convoy_id, None).await;
    let mut member = open_channel(addr, &convoy_id, Some(member_id)).await;
    let _ = snapshot_where(&mut observer, |d| d["members"][0]["status"] == "connected").await;

    member.close(None).await.unwrap();
    let seen =
        snapshot_where(&mut observer, |d| d["members"][0]["status"] == "disconnected").await;
    assert_eq!(seen["statusCounts"]["disconnected"], 1);
    assert_eq!(seen["health"], "critical");

    let resp = client
        .get(format!("http://{addr}/convoys/{convoy_id}"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["members"][0]["status"], "disconnected");
}

#[tokio::test]
async fn observer_cannot_report_location() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let mut observer = open_channel(addr, &convoy_id, None).await;
    let _ = snapshot_where(&mut observer, |_| true).await;

    send_json(&mut observer, json!({"type": "location.update", "lat": 1.0, "lng": 1.0})).await;
    let reply = next_json(&mut observer).await;
    assert_eq!(reply, json!({"type": "error", "error": "OBSERVER_READ_ONLY"}));
}

#[tokio::test]
async fn ping_and_garbage_frames_get_replies() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let mut ws = open_channel(addr, &convoy_id, None).await;
    let _ = snapshot_where(&mut ws, |_| true).await;

    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "pong"}));

    ws.send(Message::text("not json")).await.unwrap();
    assert_eq!(
        next_json(&mut ws).await,
        json!({"type": "error", "error": "INVALID_MESSAGE"})
    );

    // The channel survives a bad frame.
    send_json(&mut ws, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut ws).await, json!({"type": "pong"}));
}

#[tokio::test]
async fn unknown_convoy_or_member_refuses_upgrade() {
    let (addr, _server) = boot_server().await;
    assert!(
        connect_async(format!("ws://{addr}/ws/convoys/nope"))
            .await
            .is_err()
    );

    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    assert!(
        connect_async(format!("ws://{addr}/ws/convoys/{convoy_id}?memberId=99"))
            .await
            .is_err()
    );
}

#[tokio::test]
async fn leaving_closes_the_members_channel() {
    let (addr, server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let member_id = join(&client, addr, &convoy_id, "Alice").await;
    let mut member = open_channel(addr, &convoy_id, Some(member_id)).await;
    let _ = snapshot_where(&mut member, |_| true).await;

    let resp = client
        .delete(format!("http://{addr}/convoys/{convoy_id}/members/{member_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // The server closes the socket; drain until the stream ends.
    let drained = timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = member.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
    assert!(drained.is_ok());

    let snapshot = server
        .store()
        .snapshot(&ConvoyId::from(convoy_id.as_str()))
        .unwrap();
    assert!(snapshot.members.is_empty());
}

// ── Verification ──

#[tokio::test]
async fn verification_flow_status_codes() {
    let (addr, server) = boot_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/convoys/create-with-verification"))
        .json(&json!({"name": "Leader", "email": "leader@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    let convoy_id = ConvoyId::from(created["convoyId"].as_str().unwrap());

    // Pending convoys are served.
    let resp = client
        .get(format!("http://{addr}/convoys/{convoy_id}"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isVerified"], false);

    let resp = client
        .get(format!("http://{addr}/convoys/verify/not-a-token"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Resend rotates the token.
    let first = server
        .store()
        .get_convoy(&convoy_id)
        .unwrap()
        .verification_token
        .unwrap();
    let resp = client
        .post(format!("http://{addr}/convoys/{convoy_id}/resend-verification"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let second = server
        .store()
        .get_convoy(&convoy_id)
        .unwrap()
        .verification_token
        .unwrap();
    assert_ne!(first, second);

    let resp = client
        .get(format!("http://{addr}/convoys/verify/{first}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("http://{addr}/convoys/verify/{second}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["isVerified"], true);

    let resp = client
        .get(format!("http://{addr}/convoys/verify/{second}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_USED");
}

#[tokio::test]
async fn expired_token_is_gone() {
    let (addr, server) = boot_server().await;
    let token = VerificationToken::from("expired-token-for-test");
    let _ = server
        .store()
        .create_convoy_with_verification(
            "late@example.com",
            "Late",
            token.clone(),
            Utc::now() - chrono::Duration::seconds(5),
        )
        .unwrap();

    let resp = reqwest::get(format!("http://{addr}/convoys/verify/{token}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 410);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "TOKEN_EXPIRED");
}

// ── Ops ──

#[tokio::test]
async fn health_counts_open_channels() {
    let (addr, _server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let mut ws = open_channel(addr, &convoy_id, None).await;
    let _ = snapshot_where(&mut ws, |_| true).await;

    let body: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["convoys"], 1);
}

#[tokio::test]
async fn shutdown_closes_channels_and_refuses_upgrades() {
    let (addr, server) = boot_server().await;
    let client = reqwest::Client::new();
    let convoy_id = create_convoy(&client, addr).await;
    let mut ws = open_channel(addr, &convoy_id, None).await;
    let _ = snapshot_where(&mut ws, |_| true).await;

    server.shutdown().shutdown();
    let ended = timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());
}
