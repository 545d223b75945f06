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

use common_jwt::storage::MemoryRevocationStore;
use edge_gateway::gateway::Gateway;
use edge_gateway::hub::{BroadcastFeed, BroadcastMessage};
use edgegate_test::{json_body, serve_gateway, start_gateway, test_config, INTERNAL_KEY};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn untrusted_callers_are_rejected() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let client = reqwest::Client::new();

    let res = client
        .get(gw.url("/api/internal/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(res).await["code"], "internal_unauthorized");

    let res = client
        .get(gw.url("/api/internal/health"))
        .header("x-internal-key", "guess")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn private_network_peers_are_trusted() {
    let mut config = test_config(Default::default());
    config.internal.private_networks = vec!["127.0.0.0/8".to_string()];
    let gw = start_gateway(config, vec![]).await;

    let res = reqwest::get(gw.url("/api/internal/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connected_users"], 0);
}

#[tokio::test]
async fn internal_user_agent_is_trusted() {
    let mut config = test_config(Default::default());
    config.internal.user_agents = vec!["edgegate-internal".to_string()];
    let gw = start_gateway(config, vec![]).await;

    let res = reqwest::Client::new()
        .get(gw.url("/api/internal/websocket/stats"))
        .header("user-agent", "edgegate-internal/0.1")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["data"]["connection_count"], 0);
}

#[tokio::test]
async fn malformed_broadcast_is_a_bad_request() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let res = reqwest::Client::new()
        .post(gw.url("/api/internal/websocket/broadcast"))
        .header("x-internal-key", INTERNAL_KEY)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["code"], "bad_request");
}

#[tokio::test]
async fn online_status_for_one_and_many() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let client = reqwest::Client::new();

    let (channel, _rx) = gw.gateway.hub.open_channel();
    gw.gateway.hub.register("42", channel).await;

    let res = client
        .get(gw.url("/api/internal/users/42/online-status"))
        .header("x-internal-key", INTERNAL_KEY)
        .send()
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], "42");
    assert_eq!(body["is_online"], true);
    assert!(body["last_ping"].is_string());

    let res = client
        .post(gw.url("/api/internal/users/online-status"))
        .header("x-internal-key", INTERNAL_KEY)
        .json(&json!({"user_ids": ["42", "43"]}))
        .send()
        .await
        .unwrap();
    let body = json_body(res).await;
    assert_eq!(body["data"]["42"]["is_online"], true);
    assert_eq!(body["data"]["43"]["is_online"], false);
}

#[tokio::test]
async fn fan_out_counts_only_registered_recipients() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let hub = &gw.gateway.hub;
    let (a, mut a_rx) = hub.open_channel();
    hub.register("A", a).await;

    let message = BroadcastMessage::new("notice", json!({}));
    let attempts = hub
        .deliver(&["A".to_string(), "B".to_string()], &message)
        .await;
    assert_eq!(attempts, 1);
    assert!(a_rx.recv().await.is_some());
}

#[tokio::test]
async fn saturated_broadcast_feed_is_service_unavailable() {
    let mut gateway = Gateway::with_revocation_store(
        test_config(Default::default()),
        Arc::new(MemoryRevocationStore::new()),
    )
    .unwrap();
    // one slot and nobody draining it
    let (feed, _undrained) = BroadcastFeed::channel(1);
    gateway.feed = feed;
    let gw = serve_gateway(gateway).await;
    let client = reqwest::Client::new();

    let publish = || {
        client
            .post(gw.url("/api/internal/websocket/broadcast"))
            .header("x-internal-key", INTERNAL_KEY)
            .json(&json!({"type": "notice", "payload": {}}))
            .send()
    };

    let res = publish().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["success"], true);

    let res = publish().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(res).await;
    assert_eq!(body["code"], "broadcast_full");
    assert_eq!(body["error"], "Broadcast channel full, message not sent");
}

#[tokio::test]
async fn broadcast_with_empty_recipient_list_reaches_nobody() {
    let gw = start_gateway(test_config(Default::default()), vec![]).await;
    let hub = &gw.gateway.hub;
    let (a, mut a_rx) = hub.open_channel();
    hub.register("A", a).await;

    let res = reqwest::Client::new()
        .post(gw.url("/api/internal/websocket/broadcast"))
        .header("x-internal-key", INTERNAL_KEY)
        .json(&json!({"type": "dm", "recipients": [], "payload": {"secret": 1}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let queued = tokio::time::timeout(std::time::Duration::from_millis(200), a_rx.recv()).await;
    assert!(queued.is_err());
}
