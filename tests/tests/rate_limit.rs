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

use edgegate_test::{json_body, start_gateway, test_config};
use reqwest::StatusCode;

#[tokio::test]
async fn sixth_request_in_a_second_is_rejected_then_recovers() {
    let mut config = test_config(Default::default());
    config.rate_limit.requests_per_second = 5;
    let gw = start_gateway(config, vec![]).await;
    let client = reqwest::Client::new();

    for _ in 0..5 {
        let res = client.get(gw.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = client.get(gw.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = json_body(res).await;
    assert_eq!(body["code"], "rate_limited");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let res = client.get(gw.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn disabled_rate_limit_admits_bursts() {
    let mut config = test_config(Default::default());
    config.rate_limit.enabled = false;
    config.rate_limit.requests_per_second = 1;
    let gw = start_gateway(config, vec![]).await;
    let client = reqwest::Client::new();

    for _ in 0..10 {
        let res = client.get(gw.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn health_reports_services_and_limits() {
    let mut config = test_config(Default::default());
    config
        .services
        .insert("auth".to_string(), "http://auth-service:8001".to_string());
    let gw = start_gateway(config, vec![]).await;

    let res = reqwest::get(gw.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["auth"], "auth-service");
    assert_eq!(body["rate_limit"]["enabled"], true);
    assert_eq!(body["rate_limit"]["capacity"], 1000);
    assert_eq!(body["websocket"]["connections"], 0);
}
