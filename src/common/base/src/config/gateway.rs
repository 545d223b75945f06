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
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::CommonError;

pub const ENV_PRODUCTION: &str = "production";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub environment: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub revocation: RevocationConfig,
    pub rate_limit: RateLimitConfig,
    pub proxy: ProxyConfig,
    pub internal: InternalConfig,
    pub websocket: WebSocketConfig,
    pub cors: CorsConfig,
    /// Logical service name to backend base URL.
    pub services: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub user_secret: String,
    pub admin_secret: String,
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevocationBackend {
    Redis,
    Memory,
}

impl FromStr for RevocationBackend {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(RevocationBackend::Redis),
            "memory" => Ok(RevocationBackend::Memory),
            other => Err(CommonError::invalid_config(
                "REVOCATION_BACKEND",
                format!("unknown backend {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    pub backend: RevocationBackend,
    pub redis_addr: String,
    pub redis_password: Option<String>,
    pub redis_db: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl RevocationConfig {
    pub fn redis_url(&self) -> String {
        if self.redis_addr.starts_with("redis://") || self.redis_addr.starts_with("rediss://") {
            return self.redis_addr.clone();
        }
        match &self.redis_password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}/{}", password, self.redis_addr, self.redis_db)
            }
            _ => format!("redis://{}/{}", self.redis_addr, self.redis_db),
        }
    }

    /// `redis_addr` with any scheme and credentials stripped, safe to log.
    pub fn redis_host(&self) -> &str {
        let addr = self
            .redis_addr
            .split_once("://")
            .map_or(self.redis_addr.as_str(), |(_, rest)| rest);
        addr.rsplit_once('@').map_or(addr, |(_, host)| host)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalConfig {
    /// Shared secret expected in `X-Internal-Key`. Empty disables the check.
    pub api_key: String,
    /// User-agent prefixes recognized as internal callers.
    pub user_agents: Vec<String>,
    pub private_networks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub broadcast_capacity: usize,
    pub client_queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Connections silent for longer than this are evicted.
    #[serde(with = "humantime_serde")]
    pub stale_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub stale_sweep_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            http_port: 8080,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            jwt: JwtConfig::default(),
            revocation: RevocationConfig::default(),
            rate_limit: RateLimitConfig::default(),
            proxy: ProxyConfig::default(),
            internal: InternalConfig::default(),
            websocket: WebSocketConfig::default(),
            cors: CorsConfig::default(),
            services: default_services(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtConfig {
            user_secret: String::new(),
            admin_secret: String::new(),
            leeway: Duration::from_secs(60),
        }
    }
}

impl Default for RevocationConfig {
    fn default() -> Self {
        RevocationConfig {
            backend: RevocationBackend::Redis,
            redis_addr: "localhost:6379".to_string(),
            redis_password: None,
            redis_db: 0,
            timeout: Duration::from_secs(2),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: true,
            requests_per_second: 100,
            sweep_interval: Duration::from_secs(5 * 60),
            idle_timeout: Duration::from_secs(10 * 60),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            timeout: Duration::from_secs(30),
            trust_forwarded_for: false,
        }
    }
}

impl Default for InternalConfig {
    fn default() -> Self {
        InternalConfig {
            api_key: String::new(),
            user_agents: vec!["edgegate-internal".to_string()],
            private_networks: vec![
                "10.0.0.0/8".to_string(),
                "172.16.0.0/12".to_string(),
                "192.168.0.0/16".to_string(),
                "127.0.0.0/8".to_string(),
                "::1/128".to_string(),
                "fc00::/7".to_string(),
            ],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            broadcast_capacity: 256,
            client_queue_capacity: 256,
            ping_interval: Duration::from_secs(54),
            stale_timeout: Duration::from_secs(2 * 60),
            stale_sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

pub fn default_services() -> BTreeMap<String, String> {
    [
        ("auth", "http://auth-service:8001"),
        ("user", "http://user-service:8002"),
        ("match", "http://match-service:8003"),
        ("chat", "http://chat-service:8004"),
        ("notify", "http://notify-service:8005"),
        ("media", "http://media-service:8006"),
        ("payments", "http://payments-service:8007"),
        ("admin", "http://admin-service:8008"),
    ]
    .into_iter()
    .map(|(name, url)| (name.to_string(), url.to_string()))
    .collect()
}

impl GatewayConfig {
    /// Reads the optional TOML file, overlays the process environment and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, CommonError> {
        let mut config = match path {
            Some(path) => Self::from_toml_path(path)?,
            None => GatewayConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_path(path: &Path) -> Result<Self, CommonError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CommonError> {
        Ok(toml::from_str(content)?)
    }

    /// Overlays values found through `lookup`. Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), CommonError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.http_port = port
                .trim()
                .parse()
                .map_err(|_| CommonError::invalid_config("PORT", port.clone()))?;
        }
        if let Some(env) = get("ENVIRONMENT") {
            self.environment = env;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level;
        }

        if let Some(secret) = get("JWT_SECRET") {
            self.jwt.user_secret = secret;
        }
        if let Some(secret) = get("ADMIN_JWT_SECRET") {
            self.jwt.admin_secret = secret;
        }

        if let Some(backend) = get("REVOCATION_BACKEND") {
            self.revocation.backend = backend.parse()?;
        }
        if let Some(addr) = get("REDIS_ADDR") {
            self.revocation.redis_addr = addr;
        }
        if let Some(password) = get("REDIS_PASSWORD") {
            self.revocation.redis_password = Some(password);
        }
        if let Some(timeout) = get("REDIS_TIMEOUT") {
            self.revocation.timeout = parse_duration("REDIS_TIMEOUT", &timeout)?;
        }

        self.rate_limit.enabled = env_bool(&get, "RATE_LIMIT_ENABLED", self.rate_limit.enabled);
        self.rate_limit.requests_per_second = env_parse(
            &get,
            "RATE_LIMIT_RPS",
            self.rate_limit.requests_per_second,
        );

        if let Some(timeout) = get("HTTP_TIMEOUT") {
            self.proxy.timeout = parse_duration("HTTP_TIMEOUT", &timeout)?;
        }
        self.proxy.trust_forwarded_for = env_bool(
            &get,
            "TRUST_FORWARDED_FOR",
            self.proxy.trust_forwarded_for,
        );

        if let Some(key) = get("INTERNAL_API_KEY") {
            self.internal.api_key = key;
        }
        if let Some(agents) = get("INTERNAL_USER_AGENTS") {
            self.internal.user_agents = split_list(&agents);
        }

        if let Some(origins) = get("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = split_list(&origins);
        }

        for (name, url) in self.services.iter_mut() {
            let key = format!("{}_SERVICE_URL", name.to_ascii_uppercase());
            if let Some(value) = get(&key) {
                *url = value.trim_end_matches('/').to_string();
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CommonError> {
        if self.is_production() && self.jwt.user_secret.len() < MIN_PRODUCTION_SECRET_LEN {
            return Err(CommonError::invalid_config(
                "JWT_SECRET",
                format!("must be at least {MIN_PRODUCTION_SECRET_LEN} characters in production"),
            ));
        }
        if self.rate_limit.requests_per_second < 1 {
            return Err(CommonError::invalid_config("RATE_LIMIT_RPS", "must be at least 1"));
        }
        if self.proxy.timeout < Duration::from_secs(1) {
            return Err(CommonError::invalid_config("HTTP_TIMEOUT", "must be at least 1 second"));
        }
        if self.revocation.timeout < Duration::from_millis(100) {
            return Err(CommonError::invalid_config("REDIS_TIMEOUT", "must be at least 100ms"));
        }
        if self.cors.allowed_origins.iter().any(|o| o.trim().is_empty()) {
            return Err(CommonError::invalid_config(
                "ALLOWED_ORIGINS",
                "empty origin in list",
            ));
        }
        if self.rate_limit.sweep_interval.is_zero()
            || self.websocket.ping_interval.is_zero()
            || self.websocket.stale_sweep_interval.is_zero()
        {
            return Err(CommonError::invalid_config(
                "intervals",
                "sweep and ping intervals must be greater than zero",
            ));
        }
        if self.websocket.stale_timeout <= self.websocket.ping_interval {
            return Err(CommonError::invalid_config(
                "websocket.stale_timeout",
                "must be longer than the ping interval",
            ));
        }
        if self.websocket.broadcast_capacity == 0 || self.websocket.client_queue_capacity == 0 {
            return Err(CommonError::invalid_config(
                "websocket",
                "queue capacities must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == ENV_PRODUCTION
    }

    /// Logs the effective configuration with secrets redacted.
    pub fn log_summary(&self) {
        info!("=== Gateway Configuration ===");
        info!("Environment: {}", self.environment);
        info!("Port: {}", self.http_port);
        info!(
            "Revocation backend: {:?} ({})",
            self.revocation.backend,
            self.revocation.redis_host()
        );
        info!("Allowed Origins: {:?}", self.cors.allowed_origins);
        info!("HTTP Timeout: {}", humantime::format_duration(self.proxy.timeout));
        info!(
            "Rate Limiting: {} (RPS: {})",
            self.rate_limit.enabled, self.rate_limit.requests_per_second
        );
        info!("JWT Secret: [REDACTED {} chars]", self.jwt.user_secret.len());
        info!(
            "Admin JWT Secret: [REDACTED {} chars]",
            self.jwt.admin_secret.len()
        );
        for (name, url) in &self.services {
            info!("Service {} -> {}", name, url);
        }
        if self.jwt.user_secret.is_empty() {
            warn!("JWT_SECRET is not set; protected routes will reject requests");
        }
    }
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, CommonError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| CommonError::invalid_config(key, format!("{value}: {e}")))
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

fn env_bool<F>(get: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" | "on" => true,
            "0" | "f" | "false" | "no" | "off" => false,
            _ => {
                warn!("Invalid boolean value for {key}: {value}, using default: {default}");
                default
            }
        },
        None => default,
    }
}

fn env_parse<F, T>(get: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match get(key) {
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value for {key}: {value}, using default: {default}");
            default
        }),
        None => default,
    }
}
