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
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use common_base::config::gateway::{GatewayConfig, RevocationBackend};
use common_base::utils::time_util::now_secs;
use common_jwt::json_web_token::Claims;
use common_jwt::storage::{MemoryRevocationStore, RevocationStore};
use common_jwt::verifier::issue_token;
use edge_gateway::gateway::Gateway;
use edge_gateway::router::{RouteAccess, RouteEntry};
use edge_gateway::server::http::server::serve;
use jsonwebtoken::Algorithm;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const USER_SECRET: &str = "integration-user-secret-0123456789abcdef";
pub const ADMIN_SECRET: &str = "integration-admin-secret-0123456789abcdef";
pub const INTERNAL_KEY: &str = "integration-internal-key";

/// A gateway listening on an ephemeral port, stopped on drop.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    stop: Option<oneshot::Sender<()>>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Memory-backed revocation, no implicit internal trust, generous rate limit.
pub fn test_config(services: BTreeMap<String, String>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.jwt.user_secret = USER_SECRET.to_string();
    config.jwt.admin_secret = ADMIN_SECRET.to_string();
    config.revocation.backend = RevocationBackend::Memory;
    config.rate_limit.requests_per_second = 1000;
    config.proxy.timeout = Duration::from_secs(2);
    config.internal.api_key = INTERNAL_KEY.to_string();
    config.internal.user_agents.clear();
    config.internal.private_networks.clear();
    config.services = services;
    config
}

pub async fn start_gateway(config: GatewayConfig, routes: Vec<RouteEntry>) -> TestGateway {
    start_gateway_with_store(config, routes, Arc::new(MemoryRevocationStore::new())).await
}

pub async fn start_gateway_with_store(
    config: GatewayConfig,
    routes: Vec<RouteEntry>,
    store: Arc<dyn RevocationStore>,
) -> TestGateway {
    let gateway = Gateway::with_revocation_store(config, store)
        .unwrap()
        .with_routes(routes);
    serve_gateway(gateway).await
}

/// Serves an already assembled gateway.
pub async fn serve_gateway(gateway: Gateway) -> TestGateway {
    let gateway = Arc::new(gateway);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(serve(listener, gateway.clone(), async move {
        let _ = stopped.await;
    }));
    TestGateway {
        addr,
        gateway,
        stop: Some(stop),
    }
}

/// Echoes method, path, query and headers back as JSON. `/cookies` answers
/// with two `Set-Cookie` headers and `/slow` takes three seconds.
pub async fn start_upstream() -> SocketAddr {
    let app = Router::new().fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo(request: Request) -> Response {
    if request.uri().path() == "/slow" {
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in request.headers() {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(value.to_str().unwrap_or_default().to_string());
    }
    let body = json!({
        "method": request.method().as_str(),
        "path": request.uri().path(),
        "query": request.uri().query(),
        "headers": headers,
    });

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if request.uri().path() == "/cookies" {
        let headers = response.headers_mut();
        headers.append(SET_COOKIE, HeaderValue::from_static("session=abc; Path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark; Path=/"));
    }
    if request.uri().path() == "/teapot" {
        *response.status_mut() = StatusCode::IM_A_TEAPOT;
    }
    response
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

pub fn services(pairs: &[(&str, SocketAddr)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, addr)| (name.to_string(), format!("http://{}", addr)))
        .collect()
}

pub fn route(method: &str, path: &str, service: &str, target: &str, access: RouteAccess) -> RouteEntry {
    RouteEntry::new(method.parse().unwrap(), path, service, target, access)
}

/// HS256 token for `sub` expiring `exp_offset` seconds from now.
pub fn sign(sub: &str, exp_offset: i64, secret: &str) -> String {
    let now = now_secs() as i64;
    let mut claims = Claims::new(sub);
    claims.scope = Some("access".to_string());
    claims.iat = Some(now as u64);
    claims.exp = Some((now + exp_offset) as u64);
    issue_token(&claims, secret, Algorithm::HS256).unwrap()
}

pub fn sign_admin(sub: &str, role: &str, secret: &str) -> String {
    let now = now_secs();
    let mut claims = Claims::new(sub);
    claims.scope = Some("admin".to_string());
    claims.role = Some(role.to_string());
    claims.iat = Some(now);
    claims.exp = Some(now + 3600);
    issue_token(&claims, secret, Algorithm::HS256).unwrap()
}

pub async fn json_body(response: reqwest::Response) -> Value {
    response.json().await.unwrap()
}
