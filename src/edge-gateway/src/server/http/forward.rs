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

use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::Extension;
use log::{error, info};

use crate::auth::AuthenticatedUser;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::router::{render_path, RouteEntry};

/// Forwards one request along `route`. Dropping this future (client gone)
/// drops the outbound call with it.
pub async fn forward(
    State(gateway): State<Arc<Gateway>>,
    Path(params): Path<Vec<(String, String)>>,
    user: Option<Extension<AuthenticatedUser>>,
    request: Request,
    route: Arc<RouteEntry>,
) -> Result<Response, GatewayError> {
    let service = gateway
        .registry
        .get(&route.service)
        .ok_or_else(|| GatewayError::UnknownService(route.service.clone()))?;
    let user = user.map(|Extension(user)| user);

    if route.revokes_credential {
        if let Some(user) = &user {
            revoke(&gateway, user).await;
        }
    }

    let path = render_path(&route.target, &params);
    gateway
        .proxy
        .forward(service, &path, request, user.as_ref())
        .await
}

async fn revoke(gateway: &Gateway, user: &AuthenticatedUser) {
    match gateway.verifier.revoke(&user.token, &user.claims).await {
        Ok(Some(ttl)) => info!(
            "revoked token of subject {} for {}s",
            user.subject,
            ttl.as_secs()
        ),
        Ok(None) => {}
        // Logout still reaches the auth service.
        Err(e) => error!("failed to revoke token of subject {}: {}", user.subject, e),
    }
}
