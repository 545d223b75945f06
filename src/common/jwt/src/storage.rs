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

use std::time::{Duration, Instant};

use axum::async_trait;
use dashmap::DashMap;
use log::debug;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::OnceCell;

const REVOKED_KEY_PREFIX: &str = "blacklist:";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("revocation store did not answer within {0:?}")]
    Timeout(Duration),
}

/// Storage of revoked credentials. Implementations only ever see the digest
/// produced by [`revocation_key`], never the raw credential.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StorageError>;
    async fn is_revoked(&self, token: &str) -> Result<bool, StorageError>;
}

pub fn revocation_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{}{}", REVOKED_KEY_PREFIX, hex::encode(digest))
}

/// Redis-backed store. Entries are written with `SET EX` so Redis expires them.
pub struct RedisRevocationStore {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    timeout: Duration,
}

impl RedisRevocationStore {
    /// Parses the URL only; the connection is opened on first use.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, StorageError> {
        Ok(RedisRevocationStore {
            client: redis::Client::open(url)?,
            connection: OnceCell::new(),
            timeout,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StorageError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let manager = tokio::time::timeout(self.timeout, self.client.get_connection_manager())
                    .await
                    .map_err(|_| StorageError::Timeout(self.timeout))??;
                debug!("revocation store connected to redis");
                Ok::<_, StorageError>(manager)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StorageError> {
        let key = revocation_key(token);
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.connection().await?;
        let _: () = tokio::time::timeout(self.timeout, conn.set_ex(key, "1", seconds))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))??;
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StorageError> {
        let key = revocation_key(token);
        let mut conn = self.connection().await?;
        let exists: bool = tokio::time::timeout(self.timeout, conn.exists(key))
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))??;
        Ok(exists)
    }
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryRevocationStore {
    revoked: DashMap<String, Instant>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        MemoryRevocationStore::default()
    }

    pub fn len(&self) -> usize {
        self.revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revoked.is_empty()
    }

    pub fn delete_expired(&self) {
        let now = Instant::now();
        self.revoked.retain(|_, expiry| *expiry > now);
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), StorageError> {
        self.revoked
            .insert(revocation_key(token), Instant::now() + ttl);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, StorageError> {
        let key = revocation_key(token);
        let expired = match self.revoked.get(&key) {
            Some(expiry) => *expiry.value() <= Instant::now(),
            None => return Ok(false),
        };
        if expired {
            self.revoked.remove(&key);
            return Ok(false);
        }
        Ok(true)
    }
}
