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

use std::time::{Duration, Instant};

use edge_gateway::router::{RouteAccess, RouteEntry};
use edgegate_test::{
    closed_port, json_body, route, services, start_gateway, start_upstream, test_config,
    TestGateway,
};
use reqwest::header::SET_COOKIE;
use reqwest::StatusCode;

fn routes() -> Vec<RouteEntry> {
    vec![
        route("GET", "/api/echo", "echo", "/echo", RouteAccess::Public),
        route("POST", "/api/echo", "echo", "/echo", RouteAccess::Public),
        route("GET", "/api/cookies", "echo", "/cookies", RouteAccess::Public),
        route("GET", "/api/teapot", "echo", "/teapot", RouteAccess::Public),
        route("GET", "/api/ghost", "ghost", "/anything", RouteAccess::Public),
        route("GET", "/api/down", "down", "/anything", RouteAccess::Public),
    ]
}

async fn gateway() -> TestGateway {
    let upstream = start_upstream().await;
    let down = closed_port().await;
    start_gateway(
        test_config(services(&[("echo", upstream), ("down", down)])),
        routes(),
    )
    .await
}

#[tokio::test]
async fn repeated_response_headers_are_relayed_separately() {
    let gw = gateway().await;
    let res = reqwest::get(gw.url("/api/cookies")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cookies: Vec<_> = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(cookies, vec!["session=abc; Path=/", "theme=dark; Path=/"]);
}

#[tokio::test]
async fn request_headers_and_method_are_preserved() {
    let gw = gateway().await;
    let res = reqwest::Client::new()
        .post(gw.url("/api/echo?a=1&a=2"))
        .header("accept", "text/html")
        .header("x-request-id", "r-1")
        .header("x-user-id", "spoofed")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = json_body(res).await;
    assert_eq!(body["method"], "POST");
    assert_eq!(body["query"], "a=1&a=2");
    assert_eq!(body["headers"]["x-request-id"][0], "r-1");
    assert!(body["headers"].get("x-user-id").is_none());
    // Host is the upstream's, not the gateway's.
    assert_ne!(body["headers"]["host"][0], gw.addr.to_string());
}

#[tokio::test]
async fn upstream_status_is_relayed() {
    let gw = gateway().await;
    let res = reqwest::get(gw.url("/api/teapot")).await.unwrap();
    assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn unknown_service_is_unavailable() {
    let gw = gateway().await;
    let res = reqwest::get(gw.url("/api/ghost")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(res).await["code"], "service_unavailable");
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let gw = gateway().await;
    let res = reqwest::get(gw.url("/api/down")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(res).await;
    assert_eq!(body["code"], "upstream_unavailable");
    assert_eq!(body["error"], "Service down-service unavailable");
}

#[tokio::test]
async fn slow_upstream_times_out_as_bad_gateway() {
    let upstream = start_upstream().await;
    let mut config = test_config(services(&[("echo", upstream)]));
    config.proxy.timeout = Duration::from_secs(1);
    let gw = start_gateway(
        config,
        vec![route("GET", "/api/slow", "echo", "/slow", RouteAccess::Public)],
    )
    .await;

    let started = Instant::now();
    let res = reqwest::get(gw.url("/api/slow")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(res).await;
    assert_eq!(body["code"], "upstream_unavailable");
    assert_eq!(body["error"], "Service echo-service unavailable");
}

#[tokio::test]
async fn cors_preflight_is_answered_by_the_gateway() {
    let gw = gateway().await;
    let client = reqwest::Client::new();

    let res = client
        .request(reqwest::Method::OPTIONS, gw.url("/api/echo"))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        res.headers()["access-control-allow-origin"],
        "http://localhost:3000"
    );
    assert_eq!(res.headers()["access-control-allow-credentials"], "true");

    let res = client
        .get(gw.url("/api/echo"))
        .header("origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["access-control-allow-origin"], "null");
}
