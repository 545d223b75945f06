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

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use common_base::utils::time_util::UnixTimestamp;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::hub::BroadcastMessage;

#[derive(Debug, Deserialize)]
pub struct OnlineStatusQuery {
    pub user_ids: Vec<String>,
}

/// Accepts a message from a backend service and queues it for the hub.
pub async fn broadcast(
    State(gateway): State<Arc<Gateway>>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let message: BroadcastMessage = serde_json::from_slice(&body)
        .map_err(|_| GatewayError::BadRequest("Invalid message format".to_string()))?;
    debug!("internal broadcast of {} queued", message.kind);
    gateway.feed.try_publish(message)?;
    Ok(Json(json!({
        "success": true,
        "message": "Message broadcasted successfully",
    })))
}

async fn user_status(gateway: &Gateway, user_id: &str) -> Value {
    match gateway.hub.connection_info(user_id).await {
        Some(info) => json!({
            "is_online": true,
            "connected_at": info.connected_at,
            "last_ping": info.last_seen,
        }),
        None => json!({ "is_online": false }),
    }
}

pub async fn online_status(
    State(gateway): State<Arc<Gateway>>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    if user_id.trim().is_empty() {
        return Err(GatewayError::BadRequest("user ID is required".to_string()));
    }
    let mut status = user_status(&gateway, &user_id).await;
    status["success"] = json!(true);
    status["user_id"] = json!(user_id);
    Ok(Json(status))
}

pub async fn online_status_batch(
    State(gateway): State<Arc<Gateway>>,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let query: OnlineStatusQuery = serde_json::from_slice(&body)
        .map_err(|_| GatewayError::BadRequest("Invalid request format".to_string()))?;

    let mut results = BTreeMap::new();
    for user_id in query.user_ids {
        let status = user_status(&gateway, &user_id).await;
        results.insert(user_id, status);
    }
    Ok(Json(json!({
        "success": true,
        "data": results,
    })))
}

pub async fn websocket_stats(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    let users = gateway.hub.connected_users().await;
    Json(json!({
        "success": true,
        "data": {
            "connection_count": users.len(),
            "connected_users": users,
            "channels": gateway.hub.channel_stats().await,
            "timestamp": UnixTimestamp::now(),
        },
    }))
}

pub async fn internal_health(State(gateway): State<Arc<Gateway>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "edgegate-internal",
        "websocket": "running",
        "connected_users": gateway.hub.connection_count().await,
    }))
}
