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

use std::sync::{Arc, Weak};
use std::time::Duration;

use common_base::config::gateway::{GatewayConfig, RevocationBackend};
use common_jwt::storage::{MemoryRevocationStore, RedisRevocationStore, RevocationStore};
use common_jwt::verifier::{TokenVerifier, VerifierOptions};
use log::{info, warn};

use crate::admission::AdmissionController;
use crate::error::GatewayError;
use crate::hub::{BroadcastFeed, ConnectionHub};
use crate::proxy::ProxyClient;
use crate::registry::ServiceRegistry;
use crate::router::{default_routes, RouteEntry};
use crate::trust::InternalTrust;

/// Everything a request handler needs, shared through axum state.
pub struct Gateway {
    pub config: GatewayConfig,
    pub verifier: TokenVerifier,
    pub admission: Arc<AdmissionController>,
    pub registry: ServiceRegistry,
    pub routes: Vec<RouteEntry>,
    pub proxy: ProxyClient,
    pub hub: Arc<ConnectionHub>,
    pub feed: BroadcastFeed,
    pub internal: InternalTrust,
}

impl Gateway {
    /// Builds the gateway with the revocation backend named in `config`.
    /// Must run inside a tokio runtime: background tasks are started here.
    pub fn new(config: GatewayConfig) -> Result<Gateway, GatewayError> {
        let revocations = build_revocation_store(&config)?;
        Gateway::with_revocation_store(config, revocations)
    }

    pub fn with_revocation_store(
        config: GatewayConfig,
        revocations: Arc<dyn RevocationStore>,
    ) -> Result<Gateway, GatewayError> {
        config.validate()?;
        if config.jwt.user_secret.is_empty() {
            warn!("JWT_SECRET is not set, every protected route will reject requests");
        }

        let verifier = TokenVerifier::new(
            VerifierOptions {
                user_secret: config.jwt.user_secret.clone(),
                admin_secret: config.jwt.admin_secret.clone(),
                leeway: config.jwt.leeway,
            },
            revocations,
        );

        let admission = Arc::new(AdmissionController::new(&config.rate_limit));
        if admission.is_enabled() {
            admission.start_sweeper(config.rate_limit.sweep_interval);
        }

        let hub = Arc::new(ConnectionHub::new(config.websocket.client_queue_capacity));
        hub.start_stale_sweeper(
            config.websocket.stale_sweep_interval,
            config.websocket.stale_timeout,
        );
        let (feed, _consumer) = BroadcastFeed::start(hub.clone(), config.websocket.broadcast_capacity);

        let gateway = Gateway {
            verifier,
            admission,
            registry: ServiceRegistry::from_map(&config.services),
            routes: default_routes(),
            proxy: ProxyClient::new(config.proxy.timeout)?,
            hub,
            feed,
            internal: InternalTrust::from_config(&config.internal)?,
            config,
        };
        info!(
            "gateway ready: {} services, {} routes",
            gateway.registry.len(),
            gateway.routes.len()
        );
        Ok(gateway)
    }

    /// Replaces the route table.
    pub fn with_routes(mut self, routes: Vec<RouteEntry>) -> Self {
        self.routes = routes;
        self
    }

    pub async fn shutdown(&self) {
        self.hub.shutdown().await;
    }
}

fn build_revocation_store(config: &GatewayConfig) -> Result<Arc<dyn RevocationStore>, GatewayError> {
    match config.revocation.backend {
        RevocationBackend::Redis => {
            let store = RedisRevocationStore::new(
                &config.revocation.redis_url(),
                config.revocation.timeout,
            )
            .map_err(|e| GatewayError::Internal(format!("invalid redis settings: {}", e)))?;
            info!("token revocation backed by redis at {}", config.revocation.redis_host());
            Ok(Arc::new(store))
        }
        RevocationBackend::Memory => {
            warn!("token revocation is process-local, revoked tokens are forgotten on restart");
            let store = Arc::new(MemoryRevocationStore::new());
            start_revocation_cleanup(Arc::downgrade(&store), config.rate_limit.sweep_interval);
            Ok(store)
        }
    }
}

fn start_revocation_cleanup(store: Weak<MemoryRevocationStore>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            store.delete_expired();
        }
    });
}
