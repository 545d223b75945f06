// Copyright 2023 RobustMQ Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use edgegate_test::{sign, start_gateway, test_config, TestGateway, INTERNAL_KEY, USER_SECRET};
use futures::{SinkExt, StreamExt};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(gw: &TestGateway, subject: &str) -> Socket {
    let token = sign(subject, 3600, USER_SECRET);
    let (socket, _) = connect_async(gw.ws_url(&format!("/ws?token={}", token)))
        .await
        .unwrap();
    socket
}

/// Next text frame as JSON, skipping control frames.
async fn next_frame(socket: &mut Socket) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .ok()??;
        match message {
            Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn connect_acked(gw: &TestGateway, subject: &str) -> Socket {
    let mut socket = connect(gw, subject).await;
    let ack = next_frame(&mut socket).await.unwrap();
    assert_eq!(ack["type"], "connection_ack");
    assert_eq!(ack["data"]["user_id"], subject);
    socket
}

#[tokio::test]
async fn upgrade_requires_a_valid_token() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    assert!(connect_async(gw.ws_url("/ws")).await.is_err());

    let bad = sign("u", 3600, "wrong-secret");
    assert!(connect_async(gw.ws_url(&format!("/ws?token={}", bad)))
        .await
        .is_err());
}

#[tokio::test]
async fn bearer_header_is_accepted_for_upgrade() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut request = gw.ws_url("/ws").into_client_request().unwrap();
    let token = sign("header-user", 3600, USER_SECRET);
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    let (mut socket, _) = connect_async(request).await.unwrap();
    let ack = next_frame(&mut socket).await.unwrap();
    assert_eq!(ack["data"]["user_id"], "header-user");
}

#[tokio::test]
async fn ping_frames_get_pong() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut socket = connect_acked(&gw, "pinger").await;

    socket
        .send(Message::Text(json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut socket).await.unwrap()["type"], "pong");

    socket
        .send(Message::Text(json!({"type": "dance"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut socket).await.unwrap()["type"], "error");
}

#[tokio::test]
async fn reconnect_replaces_the_previous_connection() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut first = connect_acked(&gw, "alice").await;
    let mut second = connect_acked(&gw, "alice").await;

    assert!(next_frame(&mut first).await.is_none());
    assert_eq!(gw.gateway.hub.connection_count().await, 1);
    assert!(gw.gateway.hub.is_online("alice").await);

    second
        .send(Message::Text(json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut second).await.unwrap()["type"], "pong");
}

#[tokio::test]
async fn internal_broadcast_reaches_connected_clients() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut alice = connect_acked(&gw, "alice").await;
    let mut bob = connect_acked(&gw, "bob").await;
    let client = reqwest::Client::new();

    let res = client
        .post(gw.url("/api/internal/websocket/broadcast"))
        .header("x-internal-key", INTERNAL_KEY)
        .json(&json!({
            "type": "payment_success",
            "user_id": "alice",
            "data": {"amount": 990},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let frame = next_frame(&mut alice).await.unwrap();
    assert_eq!(frame["type"], "payment_success");
    assert_eq!(frame["data"]["amount"], 990);

    let res = client
        .post(gw.url("/api/internal/websocket/broadcast"))
        .header("x-internal-key", INTERNAL_KEY)
        .json(&json!({"type": "maintenance", "payload": "tonight"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Bob was not a recipient of the first message.
    assert_eq!(next_frame(&mut bob).await.unwrap()["type"], "maintenance");
    assert_eq!(next_frame(&mut alice).await.unwrap()["type"], "maintenance");
}

#[tokio::test]
async fn closing_the_socket_unregisters_the_client() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut socket = connect_acked(&gw, "leaver").await;
    socket.close(None).await.unwrap();

    for _ in 0..50 {
        if !gw.gateway.hub.is_online("leaver").await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("client still registered after close");
}

#[tokio::test]
async fn channel_broadcast_reaches_subscribers_only() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let mut alice = connect_acked(&gw, "alice").await;
    let mut bob = connect_acked(&gw, "bob").await;

    alice
        .send(Message::Text(
            json!({"type": "subscribe", "data": "market_updates"}).to_string(),
        ))
        .await
        .unwrap();
    let ack = next_frame(&mut alice).await.unwrap();
    assert_eq!(ack["type"], "subscription_ack");
    assert_eq!(ack["data"]["channel"], "market_updates");

    let res = reqwest::Client::new()
        .post(gw.url("/api/internal/websocket/broadcast"))
        .header("x-internal-key", INTERNAL_KEY)
        .json(&json!({
            "type": "price_change",
            "channel": "market_updates",
            "data": {"symbol": "EDGE"},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let frame = next_frame(&mut alice).await.unwrap();
    assert_eq!(frame["type"], "price_change");
    assert_eq!(frame["data"]["symbol"], "EDGE");

    // Bob never subscribed; his next frame is the pong.
    bob.send(Message::Text(json!({"type": "ping"}).to_string()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut bob).await.unwrap()["type"], "pong");
}
