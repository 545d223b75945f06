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

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use common_base::config::gateway::RateLimitConfig;
use log::{debug, info};
use serde::Serialize;
use tokio::task::JoinHandle;

/// Token bucket for one client. Refill happens lazily when the bucket is
/// consulted, so idle buckets cost nothing.
#[derive(Debug, Clone)]
pub struct ClientBucket {
    tokens: u32,
    capacity: u32,
    refill_rate: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientBucket {
    pub fn new(capacity: u32, refill_rate: u32, now: Instant) -> Self {
        ClientBucket {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
            last_seen: now,
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    /// Takes one token if any is left after refilling up to `now`.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.last_seen = now;
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }

    fn refill(&mut self, now: Instant) {
        if self.refill_rate == 0 {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = (elapsed.as_secs_f64() * f64::from(self.refill_rate)).floor() as u64;
        if earned == 0 {
            return;
        }

        let room = u64::from(self.capacity - self.tokens);
        if earned >= room {
            self.tokens = self.capacity;
            self.last_refill = now;
        } else {
            self.tokens += earned as u32;
            // Keep the fractional remainder for the next refill.
            self.last_refill += Duration::from_secs_f64(earned as f64 / f64::from(self.refill_rate));
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdmissionStats {
    pub enabled: bool,
    pub capacity: u32,
    pub refill_rate: u32,
    pub active_clients: usize,
}

/// Per-client admission control keyed by client identity (normally the peer IP).
pub struct AdmissionController {
    enabled: bool,
    capacity: u32,
    refill_rate: u32,
    idle_timeout: Duration,
    buckets: Mutex<HashMap<String, Arc<Mutex<ClientBucket>>>>,
}

impl AdmissionController {
    pub fn new(config: &RateLimitConfig) -> Self {
        AdmissionController {
            enabled: config.enabled,
            capacity: config.requests_per_second,
            refill_rate: config.requests_per_second,
            idle_timeout: config.idle_timeout,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn allow(&self, client: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let bucket = {
            let mut buckets = lock(&self.buckets);
            buckets
                .entry(client.to_string())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(ClientBucket::new(
                        self.capacity,
                        self.refill_rate,
                        Instant::now(),
                    )))
                })
                .clone()
        };

        let allowed = lock(&bucket).try_consume(Instant::now());
        if !allowed {
            debug!("rate limit exceeded for client {}", client);
        }
        allowed
    }

    /// Drops buckets untouched for longer than `idle`. Returns how many went.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = lock(&self.buckets);
        let before = buckets.len();
        buckets.retain(|_, bucket| lock(bucket).idle_for(now) <= idle);
        before - buckets.len()
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            enabled: self.enabled,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
            active_clients: lock(&self.buckets).len(),
        }
    }

    /// Periodically evicts idle buckets until the controller is dropped.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let controller: Weak<AdmissionController> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let removed = controller.sweep(controller.idle_timeout);
                if removed > 0 {
                    info!("rate limiter evicted {} idle client buckets", removed);
                }
            }
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
