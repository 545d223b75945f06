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

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, on, post, MethodFilter};
use axum::{Extension, Router};
use common_base::error::CommonError;
use log::{info, warn};
use tokio::net::TcpListener;

use super::cors::cors;
use super::forward::forward;
use super::health::health;
use super::internal::{
    broadcast, internal_health, online_status, online_status_batch, websocket_stats,
};
use super::middleware::{admission, require_admin, require_internal, require_user};
use super::ws::websocket_upgrade;
use crate::auth::AuthenticatedUser;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::router::RouteAccess;

pub const ROUTE_HEALTH: &str = "/health";
pub const ROUTE_WEBSOCKET: &str = "/ws";
pub const ROUTE_INTERNAL_BROADCAST: &str = "/api/internal/websocket/broadcast";
pub const ROUTE_INTERNAL_WEBSOCKET_STATS: &str = "/api/internal/websocket/stats";
pub const ROUTE_INTERNAL_ONLINE_STATUS: &str = "/api/internal/users/:user_id/online-status";
pub const ROUTE_INTERNAL_ONLINE_STATUS_BATCH: &str = "/api/internal/users/online-status";
pub const ROUTE_INTERNAL_HEALTH: &str = "/api/internal/health";

pub async fn start_http_server(gateway: Arc<Gateway>) -> Result<(), GatewayError> {
    let ip: SocketAddr = format!("0.0.0.0:{}", gateway.config.http_port)
        .parse()
        .map_err(CommonError::from)?;
    let listener = TcpListener::bind(ip)
        .await
        .map_err(CommonError::from)?;
    info!(
        "Gateway HTTP Server start success. bind addr:{}",
        gateway.config.http_port
    );
    serve(listener, gateway, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = routes(gateway.clone());
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(CommonError::from)?;
    gateway.shutdown().await;
    info!("Gateway HTTP Server stopped");
    Ok(())
}

pub fn routes(gateway: Arc<Gateway>) -> Router {
    let public = forwarding_routes(&gateway, RouteAccess::Public)
        .route(ROUTE_HEALTH, get(health))
        .route(ROUTE_WEBSOCKET, get(websocket_upgrade));

    let mut user = forwarding_routes(&gateway, RouteAccess::User);
    if has_routes(&gateway, RouteAccess::User) {
        user = user.route_layer(from_fn_with_state(gateway.clone(), require_user));
    }

    let mut admin = forwarding_routes(&gateway, RouteAccess::Admin);
    if has_routes(&gateway, RouteAccess::Admin) {
        admin = admin.route_layer(from_fn_with_state(gateway.clone(), require_admin));
    }

    let internal = Router::new()
        .route(ROUTE_INTERNAL_BROADCAST, post(broadcast))
        .route(ROUTE_INTERNAL_WEBSOCKET_STATS, get(websocket_stats))
        .route(ROUTE_INTERNAL_ONLINE_STATUS, get(online_status))
        .route(ROUTE_INTERNAL_ONLINE_STATUS_BATCH, post(online_status_batch))
        .route(ROUTE_INTERNAL_HEALTH, get(internal_health))
        .route_layer(from_fn_with_state(gateway.clone(), require_internal));

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .merge(internal)
        .layer(from_fn_with_state(gateway.clone(), admission))
        .layer(from_fn_with_state(gateway.clone(), cors))
        .with_state(gateway)
}

fn forwarding_routes(gateway: &Arc<Gateway>, access: RouteAccess) -> Router<Arc<Gateway>> {
    let mut router = Router::new();
    for entry in gateway.routes.iter().filter(|r| r.access == access) {
        let Ok(filter) = MethodFilter::try_from(entry.method.clone()) else {
            warn!("skipping route {} {}: unsupported method", entry.method, entry.path);
            continue;
        };
        let route = Arc::new(entry.clone());
        router = router.route(
            &entry.path,
            on(
                filter,
                move |state: State<Arc<Gateway>>,
                      params: Path<Vec<(String, String)>>,
                      user: Option<Extension<AuthenticatedUser>>,
                      request: Request| {
                    forward(state, params, user, request, route.clone())
                },
            ),
        );
    }
    router
}

// axum panics on a route layer over an empty router.
fn has_routes(gateway: &Gateway, access: RouteAccess) -> bool {
    gateway.routes.iter().any(|r| r.access == access)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
