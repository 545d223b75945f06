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

use std::net::SocketAddr;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use common_jwt::json_web_token::{Claims, VerifiedBy, VerifiedToken};

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
const FORWARDED_FOR: &str = "x-forwarded-for";

/// Attached to the request extensions once a credential has been verified.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub token: String,
    pub verified_by: VerifiedBy,
    pub claims: Claims,
}

impl AuthenticatedUser {
    pub fn new(token: &str, verified: VerifiedToken) -> Self {
        AuthenticatedUser {
            subject: verified.claims.subject().unwrap_or_default().to_string(),
            token: token.to_string(),
            verified_by: verified.verified_by,
            claims: verified.claims,
        }
    }
}

/// Bearer header first, then the `access_token` cookie.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
        let token = bearer.token().trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Key used for admission control: the first `X-Forwarded-For` hop when the
/// gateway sits behind a trusted proxy, the peer IP otherwise.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}
