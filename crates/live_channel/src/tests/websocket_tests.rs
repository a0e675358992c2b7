use super::*;
use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::json;
use shared::{domain::SessionId, protocol::InboundMessage};
use tokio::{net::TcpListener, time::timeout};

use std::time::Duration;

async fn session_room(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(answer_joins)
}

/// Acknowledges `join_room`, pushes one raw-text message, then hangs up.
async fn answer_joins(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<ChannelFrame>(&text) else {
            continue;
        };
        if frame.event != "join_room" {
            continue;
        }
        let replies = [
            json!({"event": "joined", "payload": frame.payload}),
            json!({"event": "bogus", "payload": null}),
            json!({"event": "message", "payload": "raw hello"}),
        ];
        for reply in replies {
            if socket.send(WsMessage::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
        let _ = socket.send(WsMessage::Close(None)).await;
        return;
    }
}

async fn spawn_room_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new().route("/ws", get(session_room));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn next_event(subscription: &mut Subscription) -> InboundEvent {
    timeout(Duration::from_secs(5), subscription.recv())
        .await
        .expect("event in time")
        .expect("channel open")
}

#[test]
fn channel_url_rewrites_scheme_and_appends_ws_path() {
    assert_eq!(
        channel_url_from_server_url("http://127.0.0.1:3000").expect("http"),
        "ws://127.0.0.1:3000/ws"
    );
    assert_eq!(
        channel_url_from_server_url("https://app.example.com/api/").expect("https"),
        "wss://app.example.com/api/ws"
    );
    assert!(channel_url_from_server_url("ftp://example.com").is_err());
    assert!(channel_url_from_server_url("not a url").is_err());
}

#[tokio::test]
async fn emit_before_connect_is_rejected() {
    let channel = WebSocketChannel::new("ws://127.0.0.1:9/ws");
    let err = channel
        .emit(OutboundEvent::JoinRoom(SessionId::new("s1")))
        .await
        .expect_err("not connected");
    assert!(err.to_string().contains("not connected"));
}

#[tokio::test]
async fn connect_failure_surfaces_url() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let channel = WebSocketChannel::new(format!("ws://{addr}/ws"));
    let err = channel.connect().await.expect_err("nothing listening");
    assert!(err.to_string().contains(&addr.to_string()));
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn join_round_trip_dispatches_named_events_and_disconnect() {
    let server_url = spawn_room_server().await;
    let channel =
        WebSocketChannel::new(channel_url_from_server_url(&server_url).expect("channel url"));
    let mut subscription = channel.subscribe(&[
        EventName::Connect,
        EventName::Disconnect,
        EventName::Joined,
        EventName::Message,
    ]);

    channel.connect().await.expect("connect");
    assert!(channel.is_connected());
    assert_eq!(next_event(&mut subscription).await, InboundEvent::Connect);

    channel
        .emit(OutboundEvent::JoinRoom(SessionId::new("s1")))
        .await
        .expect("join");

    assert_eq!(next_event(&mut subscription).await, InboundEvent::Joined);
    assert_eq!(
        next_event(&mut subscription).await,
        InboundEvent::Message(InboundMessage::RawText("raw hello".to_string()))
    );
    assert!(matches!(
        next_event(&mut subscription).await,
        InboundEvent::Disconnect { .. }
    ));
    assert!(!channel.is_connected());
    assert_eq!(channel.active_handlers(), 1);
}
