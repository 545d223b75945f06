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
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use common_jwt::json_web_token::{TokenDomain, TokenError, VerifiedBy};
use log::{debug, info, warn};

use crate::auth::{client_identity, extract_credential, AuthenticatedUser};
use crate::error::GatewayError;
use crate::gateway::Gateway;

pub async fn admission(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let client = client_identity(
        request.headers(),
        peer,
        gateway.config.proxy.trust_forwarded_for,
    );
    if !gateway.admission.allow(&client) {
        return Err(GatewayError::RateLimited);
    }
    Ok(next.run(request).await)
}

pub async fn require_user(
    State(gateway): State<Arc<Gateway>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let user = authenticate(&gateway, request.headers(), TokenDomain::User).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(gateway): State<Arc<Gateway>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let user = authenticate(&gateway, request.headers(), TokenDomain::Admin).await?;
    if !user.claims.is_admin() {
        warn!(
            "subject {} denied on admin route {}",
            user.subject,
            request.uri().path()
        );
        return Err(GatewayError::Forbidden);
    }
    if user.verified_by == VerifiedBy::UserSecretFallback {
        info!(
            "admin route {} used by subject {} with a user-secret token",
            request.uri().path(),
            user.subject
        );
    }
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

pub async fn require_internal(
    State(gateway): State<Arc<Gateway>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    if !gateway.internal.is_trusted(request.headers(), peer.ip()) {
        warn!(
            "rejected internal call to {} from {}",
            request.uri().path(),
            peer
        );
        return Err(GatewayError::InternalTrust);
    }
    Ok(next.run(request).await)
}

pub async fn authenticate(
    gateway: &Gateway,
    headers: &HeaderMap,
    domain: TokenDomain,
) -> Result<AuthenticatedUser, GatewayError> {
    let token = extract_credential(headers).ok_or(TokenError::Missing)?;
    verify_credential(gateway, &token, domain).await
}

pub async fn verify_credential(
    gateway: &Gateway,
    token: &str,
    domain: TokenDomain,
) -> Result<AuthenticatedUser, GatewayError> {
    let verified = gateway.verifier.verify(token, domain).await.map_err(|e| {
        debug!("token rejected: {}", e);
        e
    })?;
    if verified.claims.subject().is_none() {
        return Err(TokenError::Malformed.into());
    }
    Ok(AuthenticatedUser::new(token, verified))
}
