//! Call signaling relay over the WebSocket transport.

use crosstalk_db::{run_migrations, DbPool, DbRuntimeSettings};
use crosstalk_server::registry::SessionRegistry;
use crosstalk_server::{app, AppState};
use crosstalk_voice::{
    HttpTranslator, PipelineConfig, PiperSynthesizer, TranslationPipeline, WhisperRecognizer,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn idle_pipeline() -> Arc<TranslationPipeline> {
    Arc::new(TranslationPipeline::new(
        Arc::new(WhisperRecognizer::new("/nonexistent/whisper", "/nonexistent/model.bin")),
        Arc::new(HttpTranslator::new("http://127.0.0.1:1/translate")),
        Arc::new(PiperSynthesizer::new("/nonexistent/piper", "/nonexistent/voices")),
        PipelineConfig::default(),
    ))
}

async fn spawn_server() -> (SocketAddr, DbPool) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db_path = db_file.path().to_str().unwrap().to_string();
    std::mem::forget(db_file);

    let pool = crosstalk_db::create_pool(&db_path, DbRuntimeSettings::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }

    let state = AppState {
        pool: pool.clone(),
        registry: SessionRegistry::new(),
        pipeline: idle_pipeline(),
    };

    let app = app(state);
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

    (addr, pool)
}

fn create_account(pool: &DbPool, username: &str) {
    let conn = pool.get().unwrap();
    assert!(crosstalk_identity::create_user(&conn, username, "hunter2", "en").unwrap());
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("failed to connect");
    ws
}

async fn send(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("failed to send");
}

async fn recv(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("transport error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid json from server");
        }
    }
}

async fn register(ws: &mut WsClient, username: &str) {
    send(ws, json!({ "type": "register_user", "username": username })).await;
    send(ws, json!({ "type": "get_friends", "username": username })).await;
    loop {
        let event = recv(ws).await;
        if event["type"] == "friends_list" {
            return;
        }
        assert_eq!(event["type"], "user_online");
    }
}

#[tokio::test]
async fn offer_to_offline_callee_fails_back_to_caller() {
    let (addr, pool) = spawn_server().await;
    create_account(&pool, "alice");

    let mut alice = connect(addr).await;
    register(&mut alice, "alice").await;

    send(
        &mut alice,
        json!({
            "type": "call_user",
            "caller": "alice",
            "callee": "bob",
            "offer": { "sdp": "v=0", "type": "offer" }
        }),
    )
    .await;

    let failed = recv(&mut alice).await;
    assert_eq!(failed["type"], "call_failed");
    assert_eq!(failed["message"], "User is offline");
}

#[tokio::test]
async fn full_call_setup_relays_offer_answer_ice_and_hangup() {
    let (addr, pool) = spawn_server().await;
    create_account(&pool, "alice");
    create_account(&pool, "bob");

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    register(&mut alice, "alice").await;
    register(&mut bob, "bob").await;

    // Offer reaches the callee with the caller's identity and SDP intact.
    send(
        &mut alice,
        json!({
            "type": "call_user",
            "caller": "alice",
            "callee": "bob",
            "offer": { "sdp": "v=0 caller-sdp", "type": "offer" }
        }),
    )
    .await;
    let incoming = recv(&mut bob).await;
    assert_eq!(incoming["type"], "incoming_call");
    assert_eq!(incoming["caller"], "alice");
    assert_eq!(incoming["offer"]["sdp"], "v=0 caller-sdp");

    // Accept carries the answer SDP back to the caller.
    send(
        &mut bob,
        json!({
            "type": "call_response",
            "caller": "alice",
            "accepted": true,
            "answer": { "sdp": "v=0 callee-sdp", "type": "answer" }
        }),
    )
    .await;
    let accepted = recv(&mut alice).await;
    assert_eq!(accepted["type"], "call_accepted");
    assert_eq!(accepted["answer"]["sdp"], "v=0 callee-sdp");

    // ICE candidates flow in both directions, payloads untouched.
    send(
        &mut alice,
        json!({
            "type": "ice_candidate",
            "target": "bob",
            "candidate": { "candidate": "candidate:1 1 UDP", "sdpMLineIndex": 0 }
        }),
    )
    .await;
    let candidate = recv(&mut bob).await;
    assert_eq!(candidate["type"], "ice_candidate");
    assert_eq!(candidate["candidate"]["sdpMLineIndex"], 0);

    send(
        &mut bob,
        json!({
            "type": "ice_candidate",
            "target": "alice",
            "candidate": { "candidate": "candidate:2 1 UDP", "sdpMLineIndex": 1 }
        }),
    )
    .await;
    let candidate = recv(&mut alice).await;
    assert_eq!(candidate["type"], "ice_candidate");
    assert_eq!(candidate["candidate"]["sdpMLineIndex"], 1);

    // Hangup reaches the other party.
    send(&mut alice, json!({ "type": "end_call", "target": "bob" })).await;
    let ended = recv(&mut bob).await;
    assert_eq!(ended["type"], "call_ended");
}

#[tokio::test]
async fn rejected_call_reports_back_without_answer_payload() {
    let (addr, pool) = spawn_server().await;
    create_account(&pool, "alice");
    create_account(&pool, "bob");

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    register(&mut alice, "alice").await;
    register(&mut bob, "bob").await;

    send(
        &mut alice,
        json!({
            "type": "call_user",
            "caller": "alice",
            "callee": "bob",
            "offer": { "sdp": "v=0", "type": "offer" }
        }),
    )
    .await;
    assert_eq!(recv(&mut bob).await["type"], "incoming_call");

    // The answer field may be omitted entirely on rejection.
    send(
        &mut bob,
        json!({ "type": "call_response", "caller": "alice", "accepted": false }),
    )
    .await;
    let rejected = recv(&mut alice).await;
    assert_eq!(rejected, json!({ "type": "call_rejected" }));
}

#[tokio::test]
async fn re_registration_routes_events_to_the_newest_session() {
    let (addr, pool) = spawn_server().await;
    create_account(&pool, "alice");
    create_account(&pool, "bob");

    let mut bob_old = connect(addr).await;
    register(&mut bob_old, "bob").await;

    // A second transport claims the same identity.
    let mut bob_new = connect(addr).await;
    register(&mut bob_new, "bob").await;

    let mut alice = connect(addr).await;
    register(&mut alice, "alice").await;

    send(
        &mut alice,
        json!({
            "type": "call_user",
            "caller": "alice",
            "callee": "bob",
            "offer": { "sdp": "v=0", "type": "offer" }
        }),
    )
    .await;

    // Only the newest session sees the call.
    let incoming = recv(&mut bob_new).await;
    assert_eq!(incoming["type"], "incoming_call");

    let stale = tokio::time::timeout(Duration::from_millis(300), bob_old.next()).await;
    assert!(stale.is_err(), "replaced session must not receive events");

    // The replaced transport closing must not knock the live session
    // offline.
    bob_old.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    send(
        &mut alice,
        json!({ "type": "end_call", "target": "bob" }),
    )
    .await;
    let ended = recv(&mut bob_new).await;
    assert_eq!(ended["type"], "call_ended");
}
