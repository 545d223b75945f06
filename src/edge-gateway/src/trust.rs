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

use std::net::IpAddr;

use axum::http::header::USER_AGENT;
use axum::http::HeaderMap;
use common_base::config::gateway::InternalConfig;
use common_base::error::CommonError;
use ipnet::IpNet;

pub const HEADER_INTERNAL_KEY: &str = "x-internal-key";

/// Decides whether a caller may use the internal endpoints. Any one of a
/// matching shared key, a private peer address or a known internal user
/// agent is enough.
#[derive(Debug, Clone)]
pub struct InternalTrust {
    api_key: Option<String>,
    user_agents: Vec<String>,
    networks: Vec<IpNet>,
}

impl InternalTrust {
    pub fn from_config(config: &InternalConfig) -> Result<Self, CommonError> {
        let networks = config
            .private_networks
            .iter()
            .map(|net| {
                net.trim().parse::<IpNet>().map_err(|e| {
                    CommonError::invalid_config("internal.private_networks", format!("{}: {}", net, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InternalTrust {
            api_key: Some(config.api_key.clone()).filter(|k| !k.is_empty()),
            user_agents: config
                .user_agents
                .iter()
                .map(|ua| ua.trim().to_string())
                .filter(|ua| !ua.is_empty())
                .collect(),
            networks,
        })
    }

    pub fn is_trusted(&self, headers: &HeaderMap, peer: IpAddr) -> bool {
        self.has_valid_key(headers) || self.is_private(peer) || self.is_internal_agent(headers)
    }

    fn has_valid_key(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.api_key else {
            return false;
        };
        headers
            .get(HEADER_INTERNAL_KEY)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|presented| presented == expected)
    }

    fn is_private(&self, peer: IpAddr) -> bool {
        let peer = match peer {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(peer),
            v4 => v4,
        };
        self.networks.iter().any(|net| net.contains(&peer))
    }

    fn is_internal_agent(&self, headers: &HeaderMap) -> bool {
        let Some(agent) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        self.user_agents.iter().any(|prefix| agent.starts_with(prefix.as_str()))
    }
}
