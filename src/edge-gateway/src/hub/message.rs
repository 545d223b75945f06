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

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use common_base::utils::time_util::UnixTimestamp;

const MAX_CHANNEL_NAME_LEN: usize = 50;

/// Who a broadcast is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    /// Explicit identities. An empty list reaches nobody.
    Users(Vec<String>),
    /// Subscribers of a named channel.
    Channel(String),
}

/// A message handed to the hub by a backend service. Without recipients or
/// a channel it goes to every connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    /// Single-recipient form used by older producers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, alias = "data")]
    pub payload: Value,
}

impl BroadcastMessage {
    pub fn new(kind: &str, payload: Value) -> Self {
        BroadcastMessage {
            kind: kind.to_string(),
            recipients: None,
            user_id: None,
            channel: None,
            payload,
        }
    }

    pub fn to(mut self, recipients: Vec<String>) -> Self {
        self.recipients = Some(recipients);
        self
    }

    pub fn to_channel(mut self, channel: &str) -> Self {
        self.channel = Some(channel.to_string());
        self
    }

    /// Explicit recipients win over a channel; a message naming neither is
    /// a fan-out.
    pub fn audience(&self) -> Audience {
        let user = self.user_id.as_ref().filter(|u| !u.is_empty());
        if self.recipients.is_some() || user.is_some() {
            let mut targets: Vec<String> = self.recipients.clone().unwrap_or_default();
            if let Some(user) = user {
                if !targets.contains(user) {
                    targets.push(user.clone());
                }
            }
            return Audience::Users(targets);
        }
        match self.channel.as_ref().filter(|c| !c.is_empty()) {
            Some(channel) => Audience::Channel(channel.clone()),
            None => Audience::Everyone,
        }
    }

    /// The frame written to client sockets.
    pub fn to_frame(&self) -> String {
        frame(&self.kind, self.payload.clone())
    }
}

/// ASCII letters, digits, `_` and `-`, at most 50 characters.
pub fn is_valid_channel_name(channel: &str) -> bool {
    !channel.is_empty()
        && channel.len() <= MAX_CHANNEL_NAME_LEN
        && channel
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn frame(kind: &str, data: Value) -> String {
    json!({
        "type": kind,
        "data": data,
        "timestamp": UnixTimestamp::now(),
    })
    .to_string()
}

pub fn connection_ack(identity: &str) -> String {
    frame(
        "connection_ack",
        json!({
            "user_id": identity,
            "status": "connected",
        }),
    )
}

pub fn pong() -> String {
    frame("pong", json!({}))
}

pub fn error_frame(error_type: &str, message: &str) -> String {
    frame(
        "error",
        json!({
            "error_type": error_type,
            "message": message,
        }),
    )
}

/// Frame sent by a client over its socket.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}
