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

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use common_base::utils::time_util::now_secs;
use common_jwt::json_web_token::{TokenDomain, TokenError};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use super::middleware::verify_credential;
use crate::auth::{extract_credential, AuthenticatedUser};
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::hub::message::{
    connection_ack, error_frame, frame, is_valid_channel_name, pong, ClientFrame,
};
use crate::hub::{BroadcastMessage, ChannelReceiver, ClientChannel, ConnectionHub};

#[derive(Debug, Default, Deserialize)]
pub struct WebSocketQuery {
    pub token: Option<String>,
}

/// Authenticates before upgrading; the credential may come from the bearer
/// header, the `access_token` cookie or the `token` query parameter.
pub async fn websocket_upgrade(
    State(gateway): State<Arc<Gateway>>,
    Query(query): Query<WebSocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, GatewayError> {
    let token = extract_credential(&headers)
        .or_else(|| query.token.filter(|t| !t.trim().is_empty()))
        .ok_or(TokenError::Missing)?;
    let user = verify_credential(&gateway, &token, TokenDomain::User).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(gateway, user, socket)))
}

async fn handle_socket(gateway: Arc<Gateway>, user: AuthenticatedUser, socket: WebSocket) {
    let identity = user.subject;
    let (channel, receiver) = gateway.hub.open_channel();
    let connection_id = channel.id();
    gateway.hub.register(&identity, channel.clone()).await;
    info!("websocket connection {} established for {}", connection_id, identity);

    // Queued before the writer starts so it is the first frame out.
    let _ = channel.try_send(connection_ack(&identity));

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_loop(
        sink,
        receiver,
        gateway.config.websocket.ping_interval,
    ));
    read_loop(stream, &gateway.hub, &channel, &identity).await;

    gateway
        .hub
        .unregister_connection(&identity, connection_id)
        .await;
    channel.close();
    let _ = writer.await;
    info!("websocket connection {} closed for {}", connection_id, identity);
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut receiver: ChannelReceiver,
    ping_interval: Duration,
) {
    let mut ticker = tokio::time::interval(ping_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            frame = receiver.recv() => match frame {
                Some(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: &ConnectionHub,
    channel: &ClientChannel,
    identity: &str,
) {
    loop {
        let message = tokio::select! {
            _ = channel.closed() => break,
            message = stream.next() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                channel.touch();
                let reply = handle_frame(hub, identity, &text).await;
                if channel.try_send(reply).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => channel.touch(),
            Some(Err(e)) => {
                debug!("websocket read error for {}: {}", identity, e);
                break;
            }
        }
    }
}

/// Acts on one client frame and returns the reply for the sender.
async fn handle_frame(hub: &ConnectionHub, identity: &str, text: &str) -> String {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(_) => return error_frame("invalid_message", "invalid message format"),
    };
    match frame.kind.as_str() {
        "ping" => pong(),
        "subscribe" => subscribe(hub, identity, &frame.data).await,
        "unsubscribe" => unsubscribe(hub, identity, &frame.data).await,
        "chat" => chat(hub, identity, &frame.data).await,
        "notification" => notification_action(identity, &frame.data),
        other => {
            debug!("unknown message type {} from {}", other, identity);
            error_frame(
                "unknown_message_type",
                &format!("Unknown message type: {}", other),
            )
        }
    }
}

async fn subscribe(hub: &ConnectionHub, identity: &str, data: &Value) -> String {
    let Some(channel) = data.as_str() else {
        return error_frame("invalid_subscription_data", "Channel name must be a string");
    };
    if !is_valid_channel_name(channel) {
        return error_frame("invalid_channel_name", "Invalid channel name format");
    }
    if !hub.subscribe(identity, channel).await {
        return error_frame("not_connected", "Connection is no longer registered");
    }
    frame(
        "subscription_ack",
        json!({
            "channel": channel,
            "status": "subscribed",
            "timestamp": now_secs(),
        }),
    )
}

async fn unsubscribe(hub: &ConnectionHub, identity: &str, data: &Value) -> String {
    let Some(channel) = data.as_str() else {
        return error_frame("invalid_unsubscription_data", "Channel name must be a string");
    };
    hub.unsubscribe(identity, channel).await;
    frame(
        "unsubscription_ack",
        json!({
            "channel": channel,
            "status": "unsubscribed",
            "timestamp": now_secs(),
        }),
    )
}

#[derive(Debug, Deserialize)]
struct ChatData {
    #[serde(default)]
    conversation_id: String,
    #[serde(default)]
    message: String,
}

/// Relays a chat line to the `chat_<conversation>` channel.
async fn chat(hub: &ConnectionHub, identity: &str, data: &Value) -> String {
    let Ok(chat) = ChatData::deserialize(data) else {
        return error_frame("invalid_chat_data", "invalid data format");
    };
    if chat.conversation_id.is_empty() {
        return error_frame(
            "missing_conversation_id",
            "Missing conversation_id in chat message",
        );
    }
    if chat.message.is_empty() {
        return error_frame("empty_message", "Message cannot be empty");
    }

    let sent_at = now_secs();
    let relayed = BroadcastMessage::new(
        "chat_message",
        json!({
            "conversation_id": chat.conversation_id,
            "message": chat.message,
            "from_user": identity,
            "timestamp": sent_at,
            "type": "chat_message",
        }),
    )
    .to_channel(&format!("chat_{}", chat.conversation_id));
    let attempts = hub.dispatch(&relayed).await;
    debug!(
        "chat line from {} relayed to {} subscribers of conversation {}",
        identity, attempts, chat.conversation_id
    );

    frame(
        "chat_ack",
        json!({
            "status": "sent",
            "conversation_id": chat.conversation_id,
            "timestamp": sent_at,
        }),
    )
}

#[derive(Debug, Deserialize)]
struct NotificationAction {
    #[serde(default)]
    action: String,
    #[serde(default)]
    notification_id: String,
}

fn notification_action(identity: &str, data: &Value) -> String {
    let Ok(request) = NotificationAction::deserialize(data) else {
        return error_frame("invalid_notification_data", "invalid data format");
    };
    match request.action.as_str() {
        "mark_read" if request.notification_id.is_empty() => error_frame(
            "missing_notification_id",
            "Missing notification_id for mark_read action",
        ),
        "mark_read" => {
            debug!(
                "notification {} marked read by {}",
                request.notification_id, identity
            );
            frame(
                "notification_marked_read",
                json!({
                    "notification_id": request.notification_id,
                    "status": "read",
                    "timestamp": now_secs(),
                }),
            )
        }
        "mark_all_read" => frame(
            "all_notifications_marked_read",
            json!({
                "status": "all_read",
                "timestamp": now_secs(),
            }),
        ),
        other => error_frame(
            "unknown_notification_action",
            &format!("Unknown notification action: {}", other),
        ),
    }
}
