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

use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::HOST;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use log::{debug, warn};
use reqwest::redirect::Policy;

use crate::auth::AuthenticatedUser;
use crate::error::GatewayError;
use crate::registry::ServiceDescriptor;

pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_JWT_TOKEN: &str = "x-jwt-token";
pub const HEADER_TOKEN_DOMAIN: &str = "x-token-domain";

const MAX_REQUEST_BODY: usize = 32 * 1024 * 1024;

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

// Identity headers are only ever set by the gateway.
fn is_identity_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        HEADER_USER_ID | HEADER_JWT_TOKEN | HEADER_TOKEN_DOMAIN
    )
}

/// Headers sent to the backend: every inbound header except `host` and
/// hop-by-hop ones, repeated names kept, plus the caller's identity.
pub fn outbound_headers(inbound: &HeaderMap, user: Option<&AuthenticatedUser>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 3);
    for (name, value) in inbound {
        if *name == HOST || is_hop_by_hop(name) || is_identity_header(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Some(user) = user {
        if let Ok(value) = HeaderValue::from_str(&user.subject) {
            headers.insert(HEADER_USER_ID, value);
        }
        if let Ok(value) = HeaderValue::from_str(&user.token) {
            headers.insert(HEADER_JWT_TOKEN, value);
        }
        headers.insert(
            HEADER_TOKEN_DOMAIN,
            HeaderValue::from_static(user.verified_by.as_str()),
        );
    }
    headers
}

pub fn target_url(service: &ServiceDescriptor, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{}{}?{}", service.base_url, path, query),
        _ => format!("{}{}", service.base_url, path),
    }
}

/// Outbound HTTP client shared by every forwarded request.
#[derive(Clone)]
pub struct ProxyClient {
    client: reqwest::Client,
}

impl ProxyClient {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build http client: {}", e)))?;
        Ok(ProxyClient { client })
    }

    /// Sends `request` to `path` on `service` and relays the answer. One
    /// attempt only; any transport failure is reported as 502.
    pub async fn forward(
        &self,
        service: &ServiceDescriptor,
        path: &str,
        request: Request,
        user: Option<&AuthenticatedUser>,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let url = target_url(service, path, parts.uri.query());
        let body = to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| GatewayError::BadRequest(format!("failed to read request body: {}", e)))?;

        debug!("forwarding {} {} to {}", parts.method, parts.uri.path(), service.display_name);
        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(outbound_headers(&parts.headers, user))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                warn!("request to {} failed: {}", service.display_name, e);
                GatewayError::UpstreamUnavailable(service.display_name.clone())
            })?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if is_hop_by_hop(name) {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }
        response
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| GatewayError::Internal(format!("failed to build response: {}", e)))
    }
}
